//! Relay service error taxonomy
//!
//! User-visible failures carry a machine-readable kind alongside the human
//! message; internal detail stays in logs.

use crosslane_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("transfer {0} already known")]
    Duplicate(String),

    #[error("transfer {0} not found")]
    NotFound(String),

    #[error("transfer {0} is already being processed")]
    InProgress(String),

    #[error("source verification failed: {0}")]
    Verification(String),

    #[error("ledger unreachable: {0}")]
    Connectivity(String),

    #[error("relay service is already active")]
    AlreadyActive,

    #[error("relay service is not active")]
    NotActive,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RelayError {
    /// Machine-readable kind for API responses and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::Authorization(_) => "authorization",
            RelayError::Duplicate(_) => "duplicate",
            RelayError::NotFound(_) => "not_found",
            RelayError::InProgress(_) => "in_progress",
            RelayError::Verification(_) => "verification",
            RelayError::Connectivity(_) => "connectivity",
            RelayError::AlreadyActive | RelayError::NotActive => "control",
            RelayError::InvalidConfig(_) => "invalid_config",
            RelayError::Registry(e) => e.kind(),
        }
    }
}
