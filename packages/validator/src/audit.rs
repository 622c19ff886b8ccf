//! Append-only audit log
//!
//! Every relay decision lands here with a timestamp and a machine-readable
//! kind. The log is bounded; the oldest entries are evicted first so a
//! long-running validator cannot grow without limit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default retention.
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Observed,
    Approved,
    Rejected,
    Error,
    Control,
    ConfigChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
    /// Related transaction id, when there is one.
    pub tx_id: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(
        &mut self,
        at: DateTime<Utc>,
        kind: AuditKind,
        tx_id: Option<&str>,
        message: impl Into<String>,
    ) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry {
            at,
            kind,
            tx_id: tx_id.map(|s| s.to_string()),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest-first page of entries.
    pub fn logs(&self, limit: usize, offset: usize) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}
