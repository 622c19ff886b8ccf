//! Pending-transfer queue
//!
//! Transfers observed on either ledger wait here until they reach the
//! confirmation threshold and a terminal decision. Insertion is idempotent on
//! the transfer id, and processing of one id is serialized through a claim
//! flag taken before any registry call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crosslane_registry::{AccountId, AssetId, Direction};

use crate::error::RelayError;

/// One transfer waiting for finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    /// Bridge transaction id (source tx hash for deposits, content hash for
    /// withdrawals).
    pub id: String,
    /// Transaction id to poll on the source ledger. Equal to `id` for
    /// deposits; the observed source-side hash for withdrawals.
    pub source_tx_id: String,
    pub direction: Direction,
    pub source_address: AccountId,
    pub dest_address: AccountId,
    pub asset: AssetId,
    /// Gross amount in base units.
    pub amount: u128,
    pub confirmations: u32,
    pub observed_at: DateTime<Utc>,
    /// Source verifications that came back invalid so far.
    pub verification_failures: u32,
}

/// In-memory queue with per-id claims.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: HashMap<String, PendingTransfer>,
    claimed: HashSet<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent ingestion: a transfer id can be enqueued at most once.
    pub fn insert(&mut self, transfer: PendingTransfer) -> Result<(), RelayError> {
        if self.entries.contains_key(&transfer.id) {
            return Err(RelayError::Duplicate(transfer.id));
        }
        self.entries.insert(transfer.id.clone(), transfer);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PendingTransfer> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record fresh confirmations; never decreases.
    pub fn record_confirmations(&mut self, id: &str, confirmations: u32) -> Option<u32> {
        let entry = self.entries.get_mut(id)?;
        entry.confirmations = entry.confirmations.max(confirmations);
        Some(entry.confirmations)
    }

    /// Count one failed source verification and return the running total.
    pub fn record_verification_failure(&mut self, id: &str) -> Option<u32> {
        let entry = self.entries.get_mut(id)?;
        entry.verification_failures += 1;
        Some(entry.verification_failures)
    }

    /// Claim an id for processing. Returns false when another task already
    /// holds the claim, or the id is unknown.
    pub fn claim(&mut self, id: &str) -> bool {
        if !self.entries.contains_key(id) {
            return false;
        }
        self.claimed.insert(id.to_string())
    }

    /// Release a claim after a non-terminal failure so a later tick can retry.
    pub fn release(&mut self, id: &str) {
        self.claimed.remove(id);
    }

    /// Remove a finalized transfer and its claim.
    pub fn remove(&mut self, id: &str) -> Option<PendingTransfer> {
        self.claimed.remove(id);
        self.entries.remove(id)
    }

    /// Snapshot of all pending transfers, oldest first.
    pub fn snapshot(&self) -> Vec<PendingTransfer> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.id.cmp(&b.id)));
        entries
    }
}
