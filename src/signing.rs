// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The key the server signs its protocol messages with.
//!
//! Signatures are ECDSA over secp256k1. The signed digest is domain separated
//! and commits to the signing key's identifier, and the identifier travels
//! next to the signature so that a verifier can pick the matching public key.

use crate::errors::{KeyshareError, Result};
use k256::ecdsa::{
    signature::{DigestSigner, DigestVerifier},
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SIGNATURE_DOMAIN: &[u8] = b"keyshare-core/signed-message/v1";

/// A signature together with the id of the key that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSignature {
    /// Identifier of the signing key.
    pub key_id: u32,
    /// Fixed-size `(r, s)` encoding of the signature.
    pub signature: Vec<u8>,
}

impl TaggedSignature {
    /// Checks the signature over `message` under `verifying_key`.
    ///
    /// The caller is responsible for having selected `verifying_key` by
    /// [`TaggedSignature::key_id`].
    pub fn verify(&self, verifying_key: &VerifyingKey, message: &[u8]) -> Result<()> {
        let signature = Signature::try_from(self.signature.as_slice())
            .or(Err(KeyshareError::InvalidSignature))?;
        verifying_key
            .verify_digest(message_digest(self.key_id, message), &signature)
            .or(Err(KeyshareError::InvalidSignature))
    }
}

/// The server's message signing key.
pub struct SigningIdentity {
    key_id: u32,
    key: SigningKey,
}

impl SigningIdentity {
    /// Creates the identity from the configured key and its id.
    pub fn new(key_id: u32, key: SigningKey) -> Self {
        Self { key_id, key }
    }

    /// Identifier embedded in every signature.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// The public key verifiers need, to be distributed out of band.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Signs `message` with the active key.
    pub fn sign(&self, message: &[u8]) -> Result<TaggedSignature> {
        let signature: Signature = self
            .key
            .try_sign_digest(message_digest(self.key_id, message))
            .or(Err(KeyshareError::InternalInvariantFailed))?;
        Ok(TaggedSignature {
            key_id: self.key_id,
            signature: signature.as_ref().to_vec(),
        })
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Generates a fresh signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

fn message_digest(key_id: u32, message: &[u8]) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(SIGNATURE_DOMAIN);
    hasher.update(key_id.to_be_bytes());
    hasher.update(message);
    hasher
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_under_public_key() -> Result<()> {
        let identity = SigningIdentity::new(3, generate_signing_key());
        let signature = identity.sign(b"response")?;
        assert_eq!(signature.key_id, 3);
        signature.verify(&identity.verifying_key(), b"response")
    }

    #[test]
    fn signature_does_not_verify_for_other_message() -> Result<()> {
        let identity = SigningIdentity::new(3, generate_signing_key());
        let signature = identity.sign(b"response")?;
        assert_eq!(
            signature.verify(&identity.verifying_key(), b"other response"),
            Err(KeyshareError::InvalidSignature)
        );
        Ok(())
    }

    #[test]
    fn key_id_is_covered_by_signature() -> Result<()> {
        let identity = SigningIdentity::new(3, generate_signing_key());
        let mut signature = identity.sign(b"response")?;
        signature.key_id = 4;
        assert_eq!(
            signature.verify(&identity.verifying_key(), b"response"),
            Err(KeyshareError::InvalidSignature)
        );
        Ok(())
    }

    #[test]
    fn signature_does_not_verify_under_other_key() -> Result<()> {
        let identity = SigningIdentity::new(3, generate_signing_key());
        let other = SigningIdentity::new(3, generate_signing_key());
        let signature = identity.sign(b"response")?;
        assert_eq!(
            signature.verify(&other.verifying_key(), b"response"),
            Err(KeyshareError::InvalidSignature)
        );
        Ok(())
    }
}
