// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced by the keyshare core.
use core::fmt::Debug;
use thiserror::Error;

use crate::trust::IssuerKeyIdentifier;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, KeyshareError>;

/// Represents an error raised by one of the keyshare stores or the proof
/// protocol.
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[allow(missing_docs)]
pub enum KeyshareError {
    #[error("No encryption key is registered under id {0}")]
    UnknownKey(u32),
    #[error("Ciphertext failed authentication")]
    AuthenticationFailure,
    #[error("Issuer key `{0}` is not trusted")]
    UntrustedKey(IssuerKeyIdentifier),
    #[error("Commitment {0:#018x} is unknown, expired or already consumed")]
    UnknownCommitment(u64),
    #[error("Invalid configuration: `{0}`")]
    Configuration(String),
    #[error("Function call contained invalid arguments: `{0}`")]
    InvalidArgument(String),
    #[error("Proof session is not in a state that allows this operation")]
    InvalidSessionState,
    #[error("Failed to verify proof: `{0}`")]
    FailedToVerifyProof(String),
    #[error("Signature did not verify under the given key")]
    InvalidSignature,
    #[error("Serialization Error")]
    Serialization,
    #[error("Could not gather randomness for key generation")]
    KeyGeneration,
    #[error("Represents some code assumption that was checked at runtime but failed to be true")]
    InternalInvariantFailed,
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::KeyshareError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).or(Err(crate::errors::KeyshareError::Serialization))
    }};
}

macro_rules! verify_err {
    ($x:expr) => {{
        Err(crate::errors::KeyshareError::FailedToVerifyProof(
            String::from($x),
        ))
    }};
}

macro_rules! arg_err {
    ($x:expr) => {{
        Err(crate::errors::KeyshareError::InvalidArgument(String::from(
            $x,
        )))
    }};
}
