//! Ledger connector interfaces
//!
//! The relay never speaks a ledger's wire format directly. Each ledger is
//! reached through a `LedgerConnector`: balance lookup, transfer submission
//! (idempotent via the bridge transaction id), status/confirmation lookup,
//! and network info.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crosslane_registry::{AccountId, AssetId};

pub mod http;
pub mod mock;

pub use http::HttpLedgerConnector;
pub use mock::MockLedgerConnector;

/// Errors surfaced by connector calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("malformed ledger response: {0}")]
    InvalidResponse(String),
}

impl ConnectorError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Timeout(_) | ConnectorError::Transport(_)
        )
    }

    /// Stable label for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ConnectorError::Timeout(_) => "timeout",
            ConnectorError::Transport(_) => "transport",
            ConnectorError::Rejected(_) => "rejected",
            ConnectorError::NotFound(_) => "not_found",
            ConnectorError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// A transfer submission, idempotent on `idempotency_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    /// The bridge transaction id; resubmitting with the same key must not
    /// double-spend.
    pub idempotency_key: String,
}

/// Observed state of a source-ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub confirmations: u32,
    /// Whether the ledger considers the transaction well-formed and applied.
    pub valid: bool,
}

/// Network-level information about a ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub latest_height: u64,
    /// Base network fee in base units, if the ledger reports one.
    pub base_fee: Option<u128>,
}

/// Access to one ledger. Implementations must be safe to call concurrently.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Human-readable ledger name for logs and metrics labels.
    fn ledger_name(&self) -> &str;

    async fn get_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, ConnectorError>;

    /// Submit a transfer; returns the ledger transaction hash.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, ConnectorError>;

    async fn get_transfer_status(&self, tx_id: &str) -> Result<TransferStatus, ConnectorError>;

    async fn network_info(&self) -> Result<NetworkInfo, ConnectorError>;
}
