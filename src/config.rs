// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Startup configuration of the keyshare core.
//!
//! The enclosing server deserializes a [`RawConfiguration`] from whatever
//! format it reads its settings in, and converts it into a [`Configuration`].
//! The conversion fails if a required key is missing or malformed, in which
//! case the server must not start serving.

use crate::{
    errors::{KeyshareError, Result},
    keyring::SymmetricKey,
    parameters::DEFAULT_COMMITMENT_MAX_AGE,
};
use k256::ecdsa::SigningKey;
use serde::Deserialize;
use std::time::Duration;
use zeroize::Zeroize;

/// Unvalidated configuration, with keys in hexadecimal.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfiguration {
    /// Identifier of the active storage key.
    pub encryption_key_id: Option<u32>,
    /// The active 32-byte storage key, hex encoded.
    pub encryption_key: Option<String>,
    /// Identifier of the signing key.
    pub signing_key_id: Option<u32>,
    /// The secp256k1 signing key scalar, hex encoded.
    pub signing_key: Option<String>,
    /// How long a commitment may wait for its challenge.
    pub commitment_max_age_secs: Option<u64>,
}

impl std::fmt::Debug for RawConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawConfiguration")
            .field("encryption_key_id", &self.encryption_key_id)
            .field("signing_key_id", &self.signing_key_id)
            .field("commitment_max_age_secs", &self.commitment_max_age_secs)
            .finish_non_exhaustive()
    }
}

/// Validated configuration of the keyshare core.
pub struct Configuration {
    /// Identifier of the active storage key.
    pub encryption_key_id: u32,
    /// The active storage key.
    pub encryption_key: SymmetricKey,
    /// Identifier of the signing key.
    pub signing_key_id: u32,
    /// The key protocol messages are signed with.
    pub signing_key: SigningKey,
    /// How long a commitment may wait for its challenge. Always positive.
    pub(crate) commitment_max_age: Duration,
}

impl Configuration {
    /// Creates a configuration with the default commitment lifetime.
    pub fn new(
        encryption_key_id: u32,
        encryption_key: SymmetricKey,
        signing_key_id: u32,
        signing_key: SigningKey,
    ) -> Self {
        Self {
            encryption_key_id,
            encryption_key,
            signing_key_id,
            signing_key,
            commitment_max_age: DEFAULT_COMMITMENT_MAX_AGE,
        }
    }

    /// Replaces the commitment lifetime, which must be positive.
    pub fn with_commitment_max_age(mut self, max_age: Duration) -> Result<Self> {
        if max_age.is_zero() {
            return Err(zero_max_age());
        }
        self.commitment_max_age = max_age;
        Ok(self)
    }

    /// How long a commitment may wait for its challenge.
    pub fn commitment_max_age(&self) -> Duration {
        self.commitment_max_age
    }
}

fn zero_max_age() -> KeyshareError {
    KeyshareError::Configuration("`commitment_max_age_secs` must be positive".to_string())
}

fn missing(field: &str) -> KeyshareError {
    KeyshareError::Configuration(format!("missing required field `{field}`"))
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim())
        .map_err(|_| KeyshareError::Configuration(format!("`{field}` is not valid hex")))
}

impl TryFrom<RawConfiguration> for Configuration {
    type Error = KeyshareError;

    fn try_from(raw: RawConfiguration) -> Result<Self> {
        let encryption_key_id = raw
            .encryption_key_id
            .ok_or_else(|| missing("encryption_key_id"))?;
        let signing_key_id = raw
            .signing_key_id
            .ok_or_else(|| missing("signing_key_id"))?;

        let mut encryption_key_bytes = decode_hex(
            "encryption_key",
            raw.encryption_key
                .as_deref()
                .ok_or_else(|| missing("encryption_key"))?,
        )?;
        let encryption_key = SymmetricKey::from_slice(&encryption_key_bytes).map_err(|_| {
            KeyshareError::Configuration("`encryption_key` must be 32 bytes".to_string())
        });
        encryption_key_bytes.zeroize();

        let mut signing_key_bytes = decode_hex(
            "signing_key",
            raw.signing_key
                .as_deref()
                .ok_or_else(|| missing("signing_key"))?,
        )?;
        let signing_key = SigningKey::from_bytes(&signing_key_bytes).map_err(|_| {
            KeyshareError::Configuration("`signing_key` is not a valid secp256k1 scalar".to_string())
        });
        signing_key_bytes.zeroize();

        let commitment_max_age = match raw.commitment_max_age_secs {
            Some(0) => return Err(zero_max_age()),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_COMMITMENT_MAX_AGE,
        };

        Ok(Self {
            encryption_key_id,
            encryption_key: encryption_key?,
            signing_key_id,
            signing_key: signing_key?,
            commitment_max_age,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCRYPTION_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const SIGNING_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn full() -> RawConfiguration {
        RawConfiguration {
            encryption_key_id: Some(1),
            encryption_key: Some(ENCRYPTION_KEY.to_string()),
            signing_key_id: Some(2),
            signing_key: Some(SIGNING_KEY.to_string()),
            commitment_max_age_secs: None,
        }
    }

    #[test]
    fn complete_configuration_is_accepted() -> Result<()> {
        let config = Configuration::try_from(full())?;
        assert_eq!(config.encryption_key_id, 1);
        assert_eq!(config.signing_key_id, 2);
        assert_eq!(config.commitment_max_age, DEFAULT_COMMITMENT_MAX_AGE);
        assert_eq!(
            config.encryption_key,
            SymmetricKey::from_slice(&hex::decode(ENCRYPTION_KEY).unwrap())?
        );
        Ok(())
    }

    #[test]
    fn configuration_parses_from_json() -> Result<()> {
        let raw: RawConfiguration = serde_json::from_str(&format!(
            r#"{{
                "encryption_key_id": 5,
                "encryption_key": "{ENCRYPTION_KEY}",
                "signing_key_id": 6,
                "signing_key": "{SIGNING_KEY}",
                "commitment_max_age_secs": 30
            }}"#
        ))
        .unwrap();
        let config = Configuration::try_from(raw)?;
        assert_eq!(config.encryption_key_id, 5);
        assert_eq!(config.commitment_max_age, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn missing_keys_are_fatal() {
        let cases: [(fn(&mut RawConfiguration), &str); 4] = [
            (|raw| raw.encryption_key_id = None, "encryption_key_id"),
            (|raw| raw.encryption_key = None, "encryption_key"),
            (|raw| raw.signing_key_id = None, "signing_key_id"),
            (|raw| raw.signing_key = None, "signing_key"),
        ];
        for (strip, field) in cases {
            let mut raw = full();
            strip(&mut raw);
            match Configuration::try_from(raw) {
                Err(KeyshareError::Configuration(message)) => assert!(message.contains(field)),
                _ => panic!("configuration without `{field}` was accepted"),
            }
        }
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let mut raw = full();
        raw.encryption_key = Some("abcd".to_string());
        assert!(matches!(
            Configuration::try_from(raw),
            Err(KeyshareError::Configuration(_))
        ));

        let mut raw = full();
        raw.signing_key = Some("not hex".to_string());
        assert!(matches!(
            Configuration::try_from(raw),
            Err(KeyshareError::Configuration(_))
        ));

        let mut raw = full();
        raw.signing_key = Some("00".repeat(32));
        assert!(matches!(
            Configuration::try_from(raw),
            Err(KeyshareError::Configuration(_))
        ));
    }

    #[test]
    fn zero_commitment_age_is_rejected() {
        let mut raw = full();
        raw.commitment_max_age_secs = Some(0);
        assert!(matches!(
            Configuration::try_from(raw),
            Err(KeyshareError::Configuration(_))
        ));
    }

    #[test]
    fn zero_commitment_age_is_rejected_when_set_directly() -> Result<()> {
        let config = Configuration::try_from(full())?;
        assert!(matches!(
            config.with_commitment_max_age(Duration::ZERO),
            Err(KeyshareError::Configuration(_))
        ));

        let config =
            Configuration::try_from(full())?.with_commitment_max_age(Duration::from_millis(1))?;
        assert_eq!(config.commitment_max_age(), Duration::from_millis(1));
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<RawConfiguration>(r#"{"encryption_keyid": 1}"#);
        assert!(parsed.is_err());
    }
}
