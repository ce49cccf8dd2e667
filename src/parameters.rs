// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Security parameter definitions.
//!
//! The proof parameters follow the Idemix bit lengths used by issuers of a
//! 2048-bit modulus: secrets (attribute values) are at most `2^SECRET_BITS`,
//! challenges are hash outputs of `CHALLENGE_BITS` bits, and the statistical
//! zero-knowledge slack is `STATISTICAL_SECURITY` bits.

use std::time::Duration;

/// Size of a symmetric storage key in bytes.
pub const SYMMETRIC_KEY_BYTES: usize = 32;

/// Size of the AEAD nonce prepended to every ciphertext.
pub(crate) const NONCE_BYTES: usize = 12;

/// Upper bound (exclusive, as a power of two) on the server's secret share.
pub(crate) const SECRET_BITS: usize = 256;

/// Upper bound (exclusive, as a power of two) on verifier challenges.
pub(crate) const CHALLENGE_BITS: usize = 256;

/// Statistical security of the proof. The randomizer must exceed `c·x` by this
/// many bits for the response `r + c·x` to hide `x`.
pub(crate) const STATISTICAL_SECURITY: usize = 128;

/// Bit length of the commitment randomizer.
pub(crate) const RANDOMIZER_BITS: usize = SECRET_BITS + CHALLENGE_BITS + STATISTICAL_SECURITY;

/// Maximum age of an unconsumed commitment when the configuration does not
/// provide one.
pub const DEFAULT_COMMITMENT_MAX_AGE: Duration = Duration::from_secs(5 * 60);
