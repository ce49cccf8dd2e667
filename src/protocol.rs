// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The server side of the keyshare proof.
//!
//! The server proves knowledge of its share `x` of the user's secret in the
//! group of every issuer key the user is proving against:
//!
//! 1. [`ProtocolEngine::begin_proof`] samples a randomizer `r`, stores it in
//!    the commitment ledger and returns `P = R0^x` and `W = R0^r` (mod `N`)
//!    for every requested issuer key.
//! 2. [`ProtocolEngine::finish_proof`] takes `r` out of the ledger, computes
//!    `s = r + c·x` for the client's challenge `c`, and returns `s` signed by
//!    the server's signing identity.
//!
//! The request layer is expected to authenticate the user (PIN check) before
//! calling either method.

use crate::{
    config::Configuration,
    errors::{KeyshareError, Result},
    keyring::{EncryptedShare, KeyRing, SymmetricKey},
    ledger::CommitmentLedger,
    messages::{KeyshareResponse, ProofCommitments, ProofPCommitment, SignedResponse},
    parameters::{CHALLENGE_BITS, RANDOMIZER_BITS, SECRET_BITS},
    session::ProofSession,
    signing::SigningIdentity,
    trust::{IssuerKeyIdentifier, IssuerPublicKey, TrustStore},
    utils::{bn_in_range, modpow, random_bn_in_range},
};
use k256::ecdsa::VerifyingKey;
use libpaillier::unknown_order::BigNumber;
use rand::rngs::OsRng;
use tracing::{debug, error, instrument, warn};
use zeroize::Zeroize;

/// Assembles a [`ProtocolEngine`] at startup.
///
/// This is the only place where keys can be added beyond the ones in the
/// [`Configuration`]. Once [`ProtocolEngineBuilder::build`] has run, the key
/// ring, signing identity and trust store are read-only.
#[derive(Debug)]
pub struct ProtocolEngineBuilder {
    key_ring: KeyRing,
    signing: SigningIdentity,
    trust_store: TrustStore,
    ledger: CommitmentLedger,
}

impl ProtocolEngineBuilder {
    /// Registers a retired storage key so that shares written under it can
    /// still be decrypted.
    ///
    /// The key is not checked in any way. Every share that authenticates
    /// under it is treated as genuine, so only add keys whose provenance is
    /// certain.
    pub fn dangerous_add_legacy_encryption_key(
        mut self,
        key_id: u32,
        key: SymmetricKey,
    ) -> Result<Self> {
        self.key_ring.dangerous_add_legacy_key(key_id, key)?;
        Ok(self)
    }

    /// Trusts an issuer public key for proofs.
    ///
    /// The key is not checked in any way. Proving against incorrectly
    /// generated key material compromises the keyshare secrets of the users
    /// involved.
    pub fn dangerous_add_trusted_issuer_key(
        mut self,
        key_id: IssuerKeyIdentifier,
        key: IssuerPublicKey,
    ) -> Self {
        self.trust_store.dangerous_add_trusted_key(key_id, key);
        self
    }

    /// Finishes construction.
    pub fn build(self) -> ProtocolEngine {
        debug!(
            "Keyshare core ready: storage key {}, signing key {}, {} trusted issuer keys",
            self.key_ring.active_key_id(),
            self.signing.key_id(),
            self.trust_store.len()
        );
        ProtocolEngine {
            key_ring: self.key_ring,
            signing: self.signing,
            trust_store: self.trust_store,
            ledger: self.ledger,
        }
    }
}

/// The keyshare core: storage keys, signing identity, trusted issuer keys and
/// the table of outstanding commitments.
///
/// One instance is built at startup and shared by all request handlers.
#[derive(Debug)]
pub struct ProtocolEngine {
    key_ring: KeyRing,
    signing: SigningIdentity,
    trust_store: TrustStore,
    ledger: CommitmentLedger,
}

impl ProtocolEngine {
    /// Starts building an engine from the startup configuration.
    ///
    /// Fails with [`KeyshareError::Configuration`] if the commitment lifetime
    /// is zero.
    pub fn builder(config: Configuration) -> Result<ProtocolEngineBuilder> {
        let Configuration {
            encryption_key_id,
            encryption_key,
            signing_key_id,
            signing_key,
            commitment_max_age,
        } = config;
        Ok(ProtocolEngineBuilder {
            key_ring: KeyRing::new(encryption_key_id, encryption_key),
            signing: SigningIdentity::new(signing_key_id, signing_key),
            trust_store: TrustStore::new(),
            ledger: CommitmentLedger::new(commitment_max_age)?,
        })
    }

    /// Creates a session that tracks the state of one proof.
    pub fn session(&self) -> ProofSession<'_> {
        ProofSession::new(self)
    }

    /// Generates a new secret share for a user and encrypts it under the
    /// active storage key, for the user store to keep.
    pub fn new_user_share(&self) -> Result<EncryptedShare> {
        let secret = random_bn_in_range(&mut OsRng, SECRET_BITS);
        self.encrypt_share(&secret)
    }

    /// Re-encrypts a share under the active storage key, for moving stored
    /// shares off a retired key.
    pub fn reencrypt_share(&self, share: &EncryptedShare) -> Result<EncryptedShare> {
        self.key_ring.reencrypt(share)
    }

    /// Round one: commits to a fresh randomizer in the group of every
    /// requested issuer key.
    #[instrument(skip_all)]
    pub fn begin_proof(
        &self,
        issuer_keys: &[IssuerKeyIdentifier],
        share: &EncryptedShare,
    ) -> Result<ProofCommitments> {
        if issuer_keys.is_empty() {
            return arg_err!("a proof needs at least one issuer key");
        }
        let keys = issuer_keys
            .iter()
            .map(|key_id| self.trust_store.lookup(key_id).map(|key| (key_id, key)))
            .collect::<Result<Vec<_>>>()?;

        let secret = self.decrypt_share(share)?;
        let randomizer = random_bn_in_range(&mut OsRng, RANDOMIZER_BITS);
        let commitments = keys
            .into_iter()
            .map(|(key_id, key)| ProofPCommitment {
                issuer_key: key_id.clone(),
                public_share: modpow(key.r0(), &secret, key.n()),
                commitment: modpow(key.r0(), &randomizer, key.n()),
            })
            .collect();

        let commitment_id = self.ledger.create(randomizer)?;
        debug!("Issued commitment {:#018x}", commitment_id);
        Ok(ProofCommitments {
            commitment_id,
            commitments,
        })
    }

    /// Round two: answers `challenge` with the randomizer stored under
    /// `commitment_id`, which is consumed whether or not the rest of the
    /// computation succeeds.
    #[instrument(skip_all)]
    pub fn finish_proof(
        &self,
        commitment_id: u64,
        challenge: &BigNumber,
        share: &EncryptedShare,
        issuer_key: &IssuerKeyIdentifier,
    ) -> Result<SignedResponse> {
        if !bn_in_range(challenge, CHALLENGE_BITS) {
            return arg_err!("challenge out of range");
        }
        let key = self.trust_store.lookup(issuer_key)?;

        let randomizer = self.ledger.consume(commitment_id).map_err(|e| {
            warn!(
                "Challenge for commitment {:#018x} refused: expired, replayed or never issued",
                commitment_id
            );
            e
        })?;
        let secret = self.decrypt_share(share)?;

        let response = KeyshareResponse {
            public_share: modpow(key.r0(), &secret, key.n()),
            challenge: challenge.clone(),
            response: &randomizer + &(challenge * &secret),
        };
        let signature = self.signing.sign(&serialize!(&response)?)?;
        debug!("Answered commitment {:#018x}", commitment_id);
        Ok(SignedResponse {
            response,
            signature,
        })
    }

    /// Drops commitments older than the configured maximum age. Meant to be
    /// called periodically by the enclosing server; returns the number of
    /// dropped commitments.
    pub fn sweep_expired_commitments(&self) -> Result<usize> {
        self.ledger.sweep(self.ledger.max_age())
    }

    /// Number of commitments awaiting a challenge.
    pub fn outstanding_commitments(&self) -> Result<usize> {
        self.ledger.len()
    }

    /// Maximum age of an outstanding commitment.
    pub fn commitment_max_age(&self) -> std::time::Duration {
        self.ledger.max_age()
    }

    #[cfg(test)]
    pub(crate) fn commitment_created_at(
        &self,
        commitment_id: u64,
    ) -> Result<Option<std::time::Instant>> {
        self.ledger.created_at(commitment_id)
    }

    /// Public key and id of the signing identity.
    pub fn verifying_key(&self) -> (u32, VerifyingKey) {
        (self.signing.key_id(), self.signing.verifying_key())
    }

    /// Identifier of the storage key new shares are encrypted under.
    pub fn active_encryption_key_id(&self) -> u32 {
        self.key_ring.active_key_id()
    }

    fn encrypt_share(&self, secret: &BigNumber) -> Result<EncryptedShare> {
        let mut plaintext = secret.to_bytes();
        let share = self.key_ring.encrypt(&plaintext);
        plaintext.zeroize();
        share
    }

    fn decrypt_share(&self, share: &EncryptedShare) -> Result<BigNumber> {
        let mut plaintext = self.key_ring.decrypt(share).map_err(|e| {
            if e == KeyshareError::AuthenticationFailure {
                error!(
                    "Share under storage key {} was tampered with or is corrupt",
                    share.key_id
                );
            }
            e
        })?;
        let secret = BigNumber::from_slice(&plaintext);
        plaintext.zeroize();
        if !bn_in_range(&secret, SECRET_BITS) {
            error!("Decrypted share is out of range");
            return Err(KeyshareError::InternalInvariantFailed);
        }
        Ok(secret)
    }
}
