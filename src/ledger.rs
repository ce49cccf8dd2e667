// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The `CommitmentLedger` type for holding proof randomizers between the
//! commitment and the response round.
//!
//! Every randomizer can be taken out of the ledger at most once: answering two
//! different challenges with the same randomizer reveals the secret share. The
//! table is guarded by a single mutex that is only held for the map access
//! itself, never while computing on the values.

use crate::errors::{KeyshareError, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{rngs::OsRng, RngCore};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::{debug, error};

#[derive(Debug)]
struct CommitmentEntry {
    secret: BigNumber,
    created: Instant,
}

#[derive(Debug)]
struct LedgerState {
    entries: HashMap<u64, CommitmentEntry>,
    last_sweep: Instant,
}

impl LedgerState {
    fn remove_older_than(&mut self, cutoff: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created >= cutoff);
        self.last_sweep = Instant::now();
        before - self.entries.len()
    }
}

/// In-flight commitment randomizers, keyed by random 64-bit ids.
#[derive(Debug)]
pub struct CommitmentLedger {
    state: Mutex<LedgerState>,
    max_age: Duration,
}

impl CommitmentLedger {
    /// Creates an empty ledger whose entries expire after `max_age`, which
    /// must be positive.
    pub fn new(max_age: Duration) -> Result<Self> {
        if max_age.is_zero() {
            error!("Refusing a commitment ledger with zero lifetime");
            return Err(KeyshareError::Configuration(
                "commitment max age must be positive".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(LedgerState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            max_age,
        })
    }

    /// The age after which an unconsumed commitment is dropped.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Stores `secret` under a fresh random id and returns the id.
    ///
    /// If the last sweep is older than the maximum age, expired entries are
    /// removed first.
    pub fn create(&self, secret: BigNumber) -> Result<u64> {
        let now = Instant::now();
        let mut state = self.lock()?;

        if now.duration_since(state.last_sweep) >= self.max_age {
            if let Some(cutoff) = now.checked_sub(self.max_age) {
                let removed = state.remove_older_than(cutoff);
                if removed > 0 {
                    debug!("Dropped {} abandoned commitments", removed);
                }
            }
        }

        let mut commitment_id = OsRng.next_u64();
        while state.entries.contains_key(&commitment_id) {
            commitment_id = OsRng.next_u64();
        }
        let _ = state.entries.insert(
            commitment_id,
            CommitmentEntry {
                secret,
                created: now,
            },
        );
        Ok(commitment_id)
    }

    /// Removes and returns the secret stored under `commitment_id`.
    ///
    /// Fails with [`KeyshareError::UnknownCommitment`] if the id was never
    /// issued, was already consumed, or has outlived the maximum age. Of any
    /// number of concurrent calls with the same id, at most one succeeds.
    pub fn consume(&self, commitment_id: u64) -> Result<BigNumber> {
        let entry = self.lock()?.entries.remove(&commitment_id);
        match entry {
            Some(entry) if entry.created.elapsed() <= self.max_age => Ok(entry.secret),
            Some(_) => {
                debug!("Commitment {:#018x} expired before use", commitment_id);
                Err(KeyshareError::UnknownCommitment(commitment_id))
            }
            None => {
                debug!(
                    "Commitment {:#018x} is unknown or was already consumed",
                    commitment_id
                );
                Err(KeyshareError::UnknownCommitment(commitment_id))
            }
        }
    }

    /// Removes all entries older than `max_age`, returning how many were
    /// removed.
    pub fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let removed = match now.checked_sub(max_age) {
            Some(cutoff) => state.remove_older_than(cutoff),
            // Nothing can be older than the process clock's origin.
            None => 0,
        };
        Ok(removed)
    }

    /// Number of outstanding commitments.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Returns `true` if no commitment is outstanding.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    pub(crate) fn created_at(&self, commitment_id: u64) -> Result<Option<Instant>> {
        Ok(self
            .lock()?
            .entries
            .get(&commitment_id)
            .map(|entry| entry.created))
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|_| {
            error!("Commitment ledger lock is poisoned");
            KeyshareError::InternalInvariantFailed
        })
    }
}
