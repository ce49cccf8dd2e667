// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Issuer public keys the server is willing to produce proofs against.

use crate::errors::{KeyshareError, Result};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    str::FromStr,
};
use tracing::warn;

/// Identifies one public key of an issuer: the issuer's name within its
/// scheme (e.g. `irma-demo.RU`) and the key counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssuerKeyIdentifier {
    /// Fully qualified issuer name, `scheme.issuer`.
    pub issuer: String,
    /// Version of the issuer's key.
    pub counter: u32,
}

impl IssuerKeyIdentifier {
    /// Creates an identifier for key `counter` of `issuer`.
    pub fn new(issuer: impl Into<String>, counter: u32) -> Self {
        Self {
            issuer: issuer.into(),
            counter,
        }
    }
}

impl Display for IssuerKeyIdentifier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}-{}", self.issuer, self.counter)
    }
}

impl FromStr for IssuerKeyIdentifier {
    type Err = KeyshareError;

    fn from_str(s: &str) -> Result<Self> {
        let (issuer, counter) = s
            .rsplit_once('-')
            .ok_or_else(|| KeyshareError::InvalidArgument(format!("`{s}` has no key counter")))?;
        if issuer.is_empty() {
            return arg_err!("issuer key identifier has an empty issuer");
        }
        let counter = counter
            .parse()
            .or(arg_err!("issuer key counter is not a number"))?;
        Ok(Self::new(issuer, counter))
    }
}

/// The parts of an issuer's public key the keyshare proof needs: the group
/// modulus `n` and the base `r0` belonging to the keyshare secret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssuerPublicKey {
    n: BigNumber,
    r0: BigNumber,
}

impl IssuerPublicKey {
    /// Assembles a public key from its modulus and keyshare base.
    pub fn new(n: BigNumber, r0: BigNumber) -> Self {
        Self { n, r0 }
    }

    /// The group modulus.
    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    /// The base the keyshare secret is an exponent of.
    pub fn r0(&self) -> &BigNumber {
        &self.r0
    }
}

/// Registry of trusted issuer keys.
#[derive(Debug, Default)]
pub struct TrustStore {
    keys: HashMap<IssuerKeyIdentifier, IssuerPublicKey>,
}

impl TrustStore {
    /// Creates an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts `key` for proofs under `key_id` for the lifetime of the store.
    ///
    /// The key is not validated. Proofs are only sound against correctly
    /// generated issuer keys, so registering bad key material compromises the
    /// keyshare secrets of every user proving against it.
    pub fn dangerous_add_trusted_key(&mut self, key_id: IssuerKeyIdentifier, key: IssuerPublicKey) {
        let _ = self.keys.insert(key_id, key);
    }

    /// Looks up a trusted key.
    pub fn lookup(&self, key_id: &IssuerKeyIdentifier) -> Result<&IssuerPublicKey> {
        self.keys.get(key_id).ok_or_else(|| {
            warn!("Proof requested against untrusted issuer key {}", key_id);
            KeyshareError::UntrustedKey(key_id.clone())
        })
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no key is trusted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64, r0: u64) -> IssuerPublicKey {
        IssuerPublicKey::new(BigNumber::from(n), BigNumber::from(r0))
    }

    #[test]
    fn lookup_of_unregistered_key_fails() {
        let store = TrustStore::new();
        let id = IssuerKeyIdentifier::new("irma-demo.RU", 2);
        assert_eq!(store.lookup(&id), Err(KeyshareError::UntrustedKey(id)));
    }

    #[test]
    fn lookup_returns_registered_key() -> Result<()> {
        let mut store = TrustStore::new();
        let id = IssuerKeyIdentifier::new("irma-demo.RU", 2);
        store.dangerous_add_trusted_key(id.clone(), key(77, 5));
        assert_eq!(store.lookup(&id)?, &key(77, 5));
        assert_eq!(store.len(), 1);

        // Counters are part of the identity.
        let other_counter = IssuerKeyIdentifier::new("irma-demo.RU", 3);
        assert!(store.lookup(&other_counter).is_err());
        Ok(())
    }

    #[test]
    fn identifier_string_roundtrip() -> Result<()> {
        let id: IssuerKeyIdentifier = "irma-demo.MijnOverheid-12".parse()?;
        assert_eq!(id, IssuerKeyIdentifier::new("irma-demo.MijnOverheid", 12));
        assert_eq!(id.to_string(), "irma-demo.MijnOverheid-12");

        assert!("irma-demo.RU".parse::<IssuerKeyIdentifier>().is_err());
        assert!("-3".parse::<IssuerKeyIdentifier>().is_err());
        assert!("irma-demo.RU-x".parse::<IssuerKeyIdentifier>().is_err());
        Ok(())
    }
}
