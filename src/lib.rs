// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Server-side core of a distributed keyshare protocol.
//!
//! In a keyshare setup the secret a user proves knowledge of during
//! attribute-based credential sessions is split between the user's device and
//! a keyshare server. Neither half alone suffices to produce a proof. The
//! server only contributes its half after it has authenticated the user (for
//! example with a PIN), and it never learns the full secret.
//!
//! This crate holds the cryptographic state of such a server:
//!
//! - a [`KeyRing`] of symmetric keys that encrypt the server's shares at rest,
//!   with one active key and any number of legacy keys for rotation;
//! - the [`SigningIdentity`] that signs protocol responses;
//! - a [`TrustStore`] of issuer public keys proofs may be produced against;
//! - the [`CommitmentLedger`] of outstanding round one randomizers;
//! - the [`ProtocolEngine`] that runs the commit/challenge/response proof on
//!   top of those, optionally tracked per session by a [`ProofSession`].
//!
//! Transport, PIN verification, user storage and configuration distribution
//! are left to the enclosing server. A typical setup builds one engine at
//! startup and shares it between request handlers:
//!
//! ```no_run
//! # fn main() -> keyshare_core::errors::Result<()> {
//! use keyshare_core::{Configuration, ProtocolEngine, RawConfiguration};
//!
//! let raw = RawConfiguration::default(); // read from the server's settings
//! let engine = ProtocolEngine::builder(Configuration::try_from(raw)?)?.build();
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
pub mod errors;

mod config;
mod keyring;
mod ledger;
mod messages;
mod parameters;
mod protocol;
mod session;
mod signing;
mod trust;
mod utils;

pub use config::{Configuration, RawConfiguration};
pub use keyring::{generate_symmetric_key, EncryptedShare, KeyRing, KeyRole, SymmetricKey};
pub use ledger::CommitmentLedger;
pub use messages::{KeyshareResponse, ProofCommitments, ProofPCommitment, SignedResponse};
pub use parameters::{DEFAULT_COMMITMENT_MAX_AGE, SYMMETRIC_KEY_BYTES};
pub use protocol::{ProtocolEngine, ProtocolEngineBuilder};
pub use session::{ProofSession, SessionState};
pub use signing::{generate_signing_key, SigningIdentity, TaggedSignature};
pub use trust::{IssuerKeyIdentifier, IssuerPublicKey, TrustStore};

// Re-exported so callers can build challenges, issuer keys and signing keys
// without depending on the backends directly.
pub use libpaillier::unknown_order::BigNumber;
pub use k256::ecdsa::{SigningKey, VerifyingKey};
