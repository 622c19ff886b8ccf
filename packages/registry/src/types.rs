//! Core types for bridge transactions
//!
//! These records are the authoritative history of every cross-ledger transfer
//! attempt. They are created once and mutated only through registry
//! operations; nothing ever deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An account identifier on either ledger.
///
/// The bridge does not interpret the contents; each connector knows its own
/// address format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A bridged asset identifier (denom or token symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transfer direction across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ledger A to Ledger B
    Deposit,
    /// Ledger B to Ledger A
    Withdrawal,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing status of a bridge transaction.
///
/// `Processed` and `Rejected` are terminal; no operation leaves either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Verified,
    Processed,
    Rejected,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Verified => "verified",
            TxStatus::Processed => "processed",
            TxStatus::Rejected => "rejected",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Processed | TxStatus::Rejected)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical record of one cross-ledger transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransaction {
    /// Source ledger tx hash for deposits; content hash for withdrawals.
    pub id: String,
    pub direction: Direction,
    pub source_address: AccountId,
    pub dest_address: AccountId,
    pub asset: AssetId,
    /// Amount taken from the sender, in base units.
    pub gross_amount: u128,
    /// Bridge fee, `gross_amount * fee_rate_bps / 10000` truncated.
    pub fee: u128,
    /// Amount delivered to the recipient; always `gross_amount - fee`.
    pub net_amount: u128,
    pub status: TxStatus,
    /// Whether the net amount sits in custody for this record. Set by `lock`,
    /// cleared again when `unlock` releases the funds.
    #[serde(default)]
    pub custody_held: bool,
    /// Monotonically non-decreasing while the transaction is pending.
    pub confirmations: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Populated when the transaction is rejected.
    pub reject_reason: Option<String>,
}
