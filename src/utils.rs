// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// Computes a^e (mod n)
pub(crate) fn modpow(a: &BigNumber, e: &BigNumber, n: &BigNumber) -> BigNumber {
    a.modpow(e, n)
}

/// Generate a random non-negative BigNumber in the range 0..2^n
pub(crate) fn random_bn_in_range<R: RngCore + CryptoRng>(rng: &mut R, n: usize) -> BigNumber {
    let mut bytes = vec![0u8; (n + 7) / 8];
    rng.fill_bytes(&mut bytes);
    let excess = bytes.len() * 8 - n;
    if let Some(top) = bytes.first_mut() {
        *top &= 0xff >> excess;
    }
    BigNumber::from_slice(&bytes)
}

/// Returns `true` if `0 <= x < 2^n`.
pub(crate) fn bn_in_range(x: &BigNumber, n: usize) -> bool {
    x >= &BigNumber::zero() && x < &(BigNumber::one() << n)
}
