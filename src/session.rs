// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! This module contains [`ProofSession`], which tracks where a single proof
//! is in the commit/challenge/response exchange.
//!
//! A session starts [`Idle`](SessionState::Idle), moves to
//! [`CommitmentIssued`](SessionState::CommitmentIssued) once round one
//! succeeds, and ends in [`ResponseSent`](SessionState::ResponseSent),
//! [`Expired`](SessionState::Expired) or [`Failed`](SessionState::Failed).
//! Every state other than `Idle` and `CommitmentIssued` is terminal.

use crate::{
    errors::{KeyshareError, Result},
    keyring::EncryptedShare,
    messages::{ProofCommitments, SignedResponse},
    protocol::ProtocolEngine,
    trust::IssuerKeyIdentifier,
};
use libpaillier::unknown_order::BigNumber;
use std::time::Instant;
use tracing::{debug, error};

/// Where a [`ProofSession`] is in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No commitment has been requested yet.
    Idle,
    /// A commitment was issued and awaits its challenge.
    CommitmentIssued {
        /// The id handed to the client.
        commitment_id: u64,
    },
    /// The signed response was produced.
    ResponseSent,
    /// The commitment outlived its maximum age before the challenge arrived.
    Expired,
    /// A step of the protocol failed.
    Failed,
}

impl SessionState {
    /// Returns `true` if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ResponseSent | Self::Expired | Self::Failed)
    }
}

/// One run of the proof protocol against a [`ProtocolEngine`].
#[derive(Debug)]
pub struct ProofSession<'a> {
    engine: &'a ProtocolEngine,
    state: SessionState,
    issued_at: Option<Instant>,
}

impl<'a> ProofSession<'a> {
    pub(crate) fn new(engine: &'a ProtocolEngine) -> Self {
        Self {
            engine,
            state: SessionState::Idle,
            issued_at: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs round one. Only allowed in [`SessionState::Idle`].
    pub fn begin(
        &mut self,
        issuer_keys: &[IssuerKeyIdentifier],
        share: &EncryptedShare,
    ) -> Result<ProofCommitments> {
        if self.state != SessionState::Idle {
            error!("Round one requested in state {:?}", self.state);
            return Err(KeyshareError::InvalidSessionState);
        }

        // Taken before the ledger stamps the commitment, so the session never
        // considers a commitment younger than the ledger does.
        let started = Instant::now();
        match self.engine.begin_proof(issuer_keys, share) {
            Ok(commitments) => {
                self.state = SessionState::CommitmentIssued {
                    commitment_id: commitments.commitment_id,
                };
                self.issued_at = Some(started);
                Ok(commitments)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Runs round two for the commitment issued by [`ProofSession::begin`].
    /// Only allowed in [`SessionState::CommitmentIssued`].
    ///
    /// A challenge that is out of range or names an untrusted issuer key is
    /// refused without consuming the commitment, and the session stays in
    /// [`SessionState::CommitmentIssued`] so it can be answered again.
    pub fn finish(
        &mut self,
        challenge: &BigNumber,
        share: &EncryptedShare,
        issuer_key: &IssuerKeyIdentifier,
    ) -> Result<SignedResponse> {
        let commitment_id = match self.state {
            SessionState::CommitmentIssued { commitment_id } => commitment_id,
            state => {
                error!("Round two requested in state {:?}", state);
                return Err(KeyshareError::InvalidSessionState);
            }
        };

        let result = self
            .engine
            .finish_proof(commitment_id, challenge, share, issuer_key);
        self.state = match &result {
            Ok(_) => SessionState::ResponseSent,
            // Refused before the commitment was consumed; the caller may retry.
            Err(KeyshareError::InvalidArgument(_) | KeyshareError::UntrustedKey(_)) => {
                debug!(
                    "Commitment {:#018x} kept after a refused challenge",
                    commitment_id
                );
                self.state
            }
            Err(KeyshareError::UnknownCommitment(_)) if self.outlived_commitment() => {
                debug!("Session for commitment {:#018x} expired", commitment_id);
                SessionState::Expired
            }
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn outlived_commitment(&self) -> bool {
        self.issued_at
            .map(|issued_at| issued_at.elapsed() > self.engine.commitment_max_age())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Configuration, keyring::generate_symmetric_key, parameters::CHALLENGE_BITS,
        signing::generate_signing_key, trust::IssuerPublicKey,
    };
    use std::time::Duration;

    fn engine(max_age: Duration) -> Result<(ProtocolEngine, IssuerKeyIdentifier)> {
        let id = IssuerKeyIdentifier::new("irma-demo.RU", 2);
        let key = IssuerPublicKey::new(
            BigNumber::from(4_294_967_311u64),
            BigNumber::from(3u64),
        );
        let config = Configuration::new(1, generate_symmetric_key()?, 1, generate_signing_key())
            .with_commitment_max_age(max_age)?;
        Ok((
            ProtocolEngine::builder(config)?
                .dangerous_add_trusted_issuer_key(id.clone(), key)
                .build(),
            id,
        ))
    }

    #[test]
    fn successful_session_ends_in_response_sent() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let share = engine.new_user_share()?;
        let mut session = engine.session();
        assert_eq!(session.state(), SessionState::Idle);

        let commitments = session.begin(&[id.clone()], &share)?;
        assert_eq!(
            session.state(),
            SessionState::CommitmentIssued {
                commitment_id: commitments.commitment_id
            }
        );

        let _ = session.finish(&BigNumber::from(7u64), &share, &id)?;
        assert_eq!(session.state(), SessionState::ResponseSent);
        assert!(session.state().is_terminal());
        Ok(())
    }

    #[test]
    fn out_of_order_calls_are_refused() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let share = engine.new_user_share()?;

        let mut session = engine.session();
        assert_eq!(
            session.finish(&BigNumber::from(7u64), &share, &id),
            Err(KeyshareError::InvalidSessionState)
        );
        assert_eq!(session.state(), SessionState::Idle);

        let _ = session.begin(&[id.clone()], &share)?;
        assert_eq!(
            session.begin(&[id.clone()], &share),
            Err(KeyshareError::InvalidSessionState)
        );
        let _ = session.finish(&BigNumber::from(7u64), &share, &id)?;
        assert_eq!(
            session.finish(&BigNumber::from(7u64), &share, &id),
            Err(KeyshareError::InvalidSessionState)
        );
        Ok(())
    }

    #[test]
    fn refused_challenge_keeps_session_open() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let share = engine.new_user_share()?;

        let mut session = engine.session();
        let commitments = session.begin(&[id.clone()], &share)?;
        let issued = SessionState::CommitmentIssued {
            commitment_id: commitments.commitment_id,
        };

        let too_large = BigNumber::one() << CHALLENGE_BITS;
        assert!(matches!(
            session.finish(&too_large, &share, &id),
            Err(KeyshareError::InvalidArgument(_))
        ));
        assert_eq!(session.state(), issued);

        let unknown = IssuerKeyIdentifier::new("irma-demo.MijnOverheid", 1);
        assert_eq!(
            session.finish(&BigNumber::from(7u64), &share, &unknown),
            Err(KeyshareError::UntrustedKey(unknown))
        );
        assert_eq!(session.state(), issued);

        let _ = session.finish(&BigNumber::from(7u64), &share, &id)?;
        assert_eq!(session.state(), SessionState::ResponseSent);
        assert_eq!(engine.outstanding_commitments()?, 0);
        Ok(())
    }

    #[test]
    fn session_clock_starts_no_later_than_ledger_entry() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let share = engine.new_user_share()?;

        let mut session = engine.session();
        let commitments = session.begin(&[id], &share)?;
        let created = engine
            .commitment_created_at(commitments.commitment_id)?
            .ok_or(KeyshareError::InternalInvariantFailed)?;
        let issued_at = session
            .issued_at
            .ok_or(KeyshareError::InternalInvariantFailed)?;
        // Whenever the ledger finds the commitment expired, so does the session.
        assert!(issued_at <= created);
        Ok(())
    }

    #[test]
    fn failed_round_one_ends_session() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let mut share = engine.new_user_share()?;
        share.key_id = 99;

        let mut session = engine.session();
        assert_eq!(
            session.begin(&[id], &share),
            Err(KeyshareError::UnknownKey(99))
        );
        assert_eq!(session.state(), SessionState::Failed);
        Ok(())
    }

    #[test]
    fn late_challenge_expires_session() -> Result<()> {
        let (engine, id) = engine(Duration::from_millis(10))?;
        let share = engine.new_user_share()?;

        let mut session = engine.session();
        let commitments = session.begin(&[id.clone()], &share)?;
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            session.finish(&BigNumber::from(7u64), &share, &id),
            Err(KeyshareError::UnknownCommitment(commitments.commitment_id))
        );
        assert_eq!(session.state(), SessionState::Expired);
        Ok(())
    }

    #[test]
    fn replayed_commitment_fails_session() -> Result<()> {
        let (engine, id) = engine(Duration::from_secs(60))?;
        let share = engine.new_user_share()?;

        let mut session = engine.session();
        let commitments = session.begin(&[id.clone()], &share)?;
        // Another request answers the same commitment first.
        let _ = engine.finish_proof(
            commitments.commitment_id,
            &BigNumber::from(5u64),
            &share,
            &id,
        )?;

        assert_eq!(
            session.finish(&BigNumber::from(7u64), &share, &id),
            Err(KeyshareError::UnknownCommitment(commitments.commitment_id))
        );
        assert_eq!(session.state(), SessionState::Failed);
        Ok(())
    }
}
