// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Storage keys for the server's secret shares.
//!
//! A [`KeyRing`] has exactly one active key, used for every new encryption,
//! and any number of legacy keys that are only used to decrypt shares that
//! were written before a rotation. Ciphertexts carry the id of the key that
//! produced them, and that id is authenticated as associated data, so a share
//! relabelled with another key's id fails to decrypt instead of decrypting
//! under the wrong key.

use crate::{
    errors::{KeyshareError, Result},
    parameters::{NONCE_BYTES, SYMMETRIC_KEY_BYTES},
};
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 256-bit symmetric storage key. The key material is wiped on drop.
///
/// Keys are not comparable outside of tests, so key material is never fed
/// to a variable-time equality check.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_BYTES]);

impl SymmetricKey {
    /// Wraps existing key material.
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parses a key from a slice, which must be exactly
    /// [`SYMMETRIC_KEY_BYTES`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SYMMETRIC_KEY_BYTES] = bytes
            .try_into()
            .or(arg_err!("symmetric keys must be 32 bytes"))?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Generates a fresh storage key from the operating system's CSPRNG, for
/// provisioning a key rotation.
pub fn generate_symmetric_key() -> Result<SymmetricKey> {
    let mut bytes = [0u8; SYMMETRIC_KEY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .or(Err(KeyshareError::KeyGeneration))?;
    let key = SymmetricKey(bytes);
    bytes.zeroize();
    Ok(key)
}

/// What a registered key may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Used for all new encryptions; also decrypts.
    Active,
    /// Only decrypts ciphertexts written before a rotation.
    LegacyDecryptOnly,
}

#[derive(Clone, Debug)]
struct RegisteredKey {
    key: SymmetricKey,
    role: KeyRole,
}

/// A secret share encrypted under one of the keys of a [`KeyRing`].
///
/// This is the opaque blob handed to the external user store. The layout of
/// `ciphertext` is `nonce || encrypted share || tag`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// Identifier of the key the share was encrypted under.
    pub key_id: u32,
    /// Nonce, ciphertext and authentication tag.
    pub ciphertext: Vec<u8>,
}

/// The set of storage keys known to this server.
#[derive(Debug)]
pub struct KeyRing {
    keys: HashMap<u32, RegisteredKey>,
    active_id: u32,
}

impl KeyRing {
    /// Creates a key ring whose active key is `active_key`, registered under
    /// `active_id`.
    pub fn new(active_id: u32, active_key: SymmetricKey) -> Self {
        let mut keys = HashMap::new();
        let _ = keys.insert(
            active_id,
            RegisteredKey {
                key: active_key,
                role: KeyRole::Active,
            },
        );
        Self { keys, active_id }
    }

    /// Registers a key that may only be used to decrypt existing shares.
    ///
    /// This is unchecked: every ciphertext that authenticates under `key` will
    /// be trusted as a genuine share, so the caller must be certain of the
    /// key's provenance. An existing legacy key with the same id is replaced;
    /// the active key cannot be replaced this way.
    pub fn dangerous_add_legacy_key(&mut self, key_id: u32, key: SymmetricKey) -> Result<()> {
        if key_id == self.active_id {
            return arg_err!("legacy key id collides with the active key id");
        }
        let _ = self.keys.insert(
            key_id,
            RegisteredKey {
                key,
                role: KeyRole::LegacyDecryptOnly,
            },
        );
        Ok(())
    }

    /// Makes `key` the active key. The previously active key stays registered
    /// as a legacy key, so shares written under it keep decrypting until they
    /// are re-encrypted.
    pub fn rotate(&mut self, key_id: u32, key: SymmetricKey) -> Result<()> {
        if self.keys.contains_key(&key_id) {
            return arg_err!("rotation requires a key id that was never registered");
        }
        if let Some(previous) = self.keys.get_mut(&self.active_id) {
            previous.role = KeyRole::LegacyDecryptOnly;
        }
        let _ = self.keys.insert(
            key_id,
            RegisteredKey {
                key,
                role: KeyRole::Active,
            },
        );
        debug!(
            "Rotated storage key from {} to {}",
            self.active_id, key_id
        );
        self.active_id = key_id;
        Ok(())
    }

    /// Identifier of the key used for new encryptions.
    pub fn active_key_id(&self) -> u32 {
        self.active_id
    }

    /// The role of the key registered under `key_id`, if any.
    pub fn role(&self, key_id: u32) -> Option<KeyRole> {
        self.keys.get(&key_id).map(|registered| registered.role)
    }

    /// Encrypts `plaintext` under the active key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedShare> {
        let registered = self
            .keys
            .get(&self.active_id)
            .ok_or(KeyshareError::InternalInvariantFailed)?;

        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let aad = self.active_id.to_be_bytes();
        let sealed = registered
            .key
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .or(Err(KeyshareError::InternalInvariantFailed))?;

        Ok(EncryptedShare {
            key_id: self.active_id,
            ciphertext: [nonce.as_slice(), sealed.as_slice()].concat(),
        })
    }

    /// Decrypts a share with the key recorded in it.
    pub fn decrypt(&self, share: &EncryptedShare) -> Result<Vec<u8>> {
        let registered = self.keys.get(&share.key_id).ok_or_else(|| {
            warn!("Share references unregistered storage key {}", share.key_id);
            KeyshareError::UnknownKey(share.key_id)
        })?;

        if share.ciphertext.len() < NONCE_BYTES {
            warn!("Share under key {} is truncated", share.key_id);
            return Err(KeyshareError::AuthenticationFailure);
        }
        let (nonce, sealed) = share.ciphertext.split_at(NONCE_BYTES);
        let aad = share.key_id.to_be_bytes();
        registered
            .key
            .cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                warn!("Share under key {} failed authentication", share.key_id);
                KeyshareError::AuthenticationFailure
            })
    }

    /// Re-wraps a share under the active key. Shares that already use the
    /// active key are returned unchanged.
    pub fn reencrypt(&self, share: &EncryptedShare) -> Result<EncryptedShare> {
        if share.key_id == self.active_id {
            return Ok(share.clone());
        }
        let mut plaintext = self.decrypt(share)?;
        let reencrypted = self.encrypt(&plaintext);
        plaintext.zeroize();
        reencrypted
    }
}
