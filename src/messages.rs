//! Types and methods for the values the proof protocol hands back to the
//! request layer.

// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Contains the round one commitments and the signed round two response of
//! the keyshare proof, together with the checks a verifier runs on them.

use crate::{
    errors::{KeyshareError, Result},
    signing::TaggedSignature,
    trust::{IssuerKeyIdentifier, IssuerPublicKey},
    utils::modpow,
};
use k256::ecdsa::VerifyingKey;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// The server's round one contribution for one issuer key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofPCommitment {
    /// The issuer key the values are computed in.
    pub issuer_key: IssuerKeyIdentifier,
    /// The server's public share `P = R0^x mod N`.
    pub public_share: BigNumber,
    /// The commitment `W = R0^r mod N`.
    pub commitment: BigNumber,
}

/// Result of starting a proof: the id the client must quote in round two and
/// one commitment per requested issuer key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofCommitments {
    /// Identifier of the stored randomizer.
    pub commitment_id: u64,
    /// Commitments, in the order the issuer keys were requested.
    pub commitments: Vec<ProofPCommitment>,
}

/// The server's answer to a challenge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyshareResponse {
    /// The server's public share `P`.
    pub public_share: BigNumber,
    /// The challenge `c` being answered.
    pub challenge: BigNumber,
    /// The response `s = r + c·x`.
    pub response: BigNumber,
}

impl KeyshareResponse {
    /// Checks `R0^s == W · P^c (mod N)` for the commitment `W` issued in round
    /// one.
    pub fn verify(&self, issuer_key: &IssuerPublicKey, commitment: &BigNumber) -> Result<()> {
        let n = issuer_key.n();
        let lhs = modpow(issuer_key.r0(), &self.response, n);
        let rhs = commitment.modmul(&modpow(&self.public_share, &self.challenge, n), n);
        if lhs != rhs {
            return verify_err!("response does not match commitment and challenge");
        }
        Ok(())
    }
}

/// A [`KeyshareResponse`] signed by the server's signing identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedResponse {
    /// The signed response.
    pub response: KeyshareResponse,
    /// Signature over the serialized response.
    pub signature: TaggedSignature,
}

impl SignedResponse {
    /// Identifier of the key that signed the response.
    pub fn key_id(&self) -> u32 {
        self.signature.key_id
    }

    /// Verifies the signature and returns the response it covers.
    #[instrument(skip_all)]
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<&KeyshareResponse> {
        let message = serialize!(&self.response)?;
        self.signature.verify(verifying_key, &message)?;
        Ok(&self.response)
    }

    /// Serializes the signed response for the transport layer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    /// Parses a signed response produced by [`SignedResponse::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes).map_err(|e: KeyshareError| {
            error!("Could not deserialize a signed keyshare response");
            e
        })
    }
}
