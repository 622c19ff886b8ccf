//! Registry error taxonomy
//!
//! Every operation is all-or-nothing: when one of these errors is returned,
//! no registry state has been mutated.

use thiserror::Error;

use crate::types::{AccountId, AssetId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("asset {0} is not supported")]
    UnsupportedAsset(AssetId),

    #[error("amount {amount} outside bounds [{min}, {max}]")]
    AmountOutOfBounds { amount: u128, min: u128, max: u128 },

    #[error("amount arithmetic overflow")]
    AmountOverflow,

    #[error("{0} is not an authorized validator")]
    UnauthorizedValidator(AccountId),

    #[error("{0} is not the registry owner")]
    UnauthorizedOwner(AccountId),

    #[error("amount {actual} does not match recorded gross amount {expected}")]
    AmountMismatch { expected: u128, actual: u128 },

    #[error("transaction {0} already reached a terminal state")]
    DuplicateTransaction(String),

    #[error("transaction {0} not found")]
    UnknownTransaction(String),

    #[error("source transaction verification failed: {0}")]
    VerificationFailed(String),

    /// Source ledger could not be reached; retryable, the transaction stays
    /// in its current state.
    #[error("source transaction verification unavailable")]
    VerificationUnavailable,

    #[error("registry is paused")]
    Paused,

    #[error("registry is not paused")]
    NotPaused,

    #[error("{account} has insufficient {asset} balance: have {have}, need {need}")]
    InsufficientFunds {
        account: AccountId,
        asset: AssetId,
        have: u128,
        need: u128,
    },

    /// Custody cannot cover a payout. This indicates an accounting bug and
    /// requires operator intervention; it must never be swallowed.
    #[error("FATAL custody shortfall for {asset}: custody holds {have}, payout needs {need}")]
    InsufficientCustody {
        asset: AssetId,
        have: u128,
        need: u128,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RegistryError {
    /// Machine-readable kind for API responses and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::UnsupportedAsset(_)
            | RegistryError::AmountOutOfBounds { .. }
            | RegistryError::AmountOverflow
            | RegistryError::AmountMismatch { .. } => "validation",
            RegistryError::UnauthorizedValidator(_) | RegistryError::UnauthorizedOwner(_) => {
                "authorization"
            }
            RegistryError::DuplicateTransaction(_) => "duplicate",
            RegistryError::UnknownTransaction(_) => "not_found",
            RegistryError::VerificationFailed(_) => "verification",
            RegistryError::VerificationUnavailable => "connectivity",
            RegistryError::Paused | RegistryError::NotPaused => "paused",
            RegistryError::InsufficientFunds { .. } => "insufficient_funds",
            RegistryError::InsufficientCustody { .. } => "fatal_accounting",
            RegistryError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Fatal errors must abort processing and page an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegistryError::InsufficientCustody { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RegistryError::UnsupportedAsset(AssetId::new("DOGE")).kind(),
            "validation"
        );
        assert_eq!(
            RegistryError::DuplicateTransaction("abc".into()).kind(),
            "duplicate"
        );
        assert_eq!(RegistryError::VerificationUnavailable.kind(), "connectivity");
    }

    #[test]
    fn test_only_custody_shortfall_is_fatal() {
        let fatal = RegistryError::InsufficientCustody {
            asset: AssetId::new("XLN"),
            have: 1,
            need: 2,
        };
        assert!(fatal.is_fatal());
        assert!(!RegistryError::Paused.is_fatal());
        assert!(!RegistryError::DuplicateTransaction("x".into()).is_fatal());
    }
}
