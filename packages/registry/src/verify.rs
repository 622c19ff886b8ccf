//! Pluggable source-transaction verification
//!
//! `unlock`/`mint` release funds only after the referenced source transaction
//! is independently verified. The registry delegates that check to a
//! `Verifier` capability so the trust model lives in one swappable place.

/// Details reported by a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedDetails {
    /// Confirmations observed on the source ledger.
    pub confirmations: u32,
}

/// Outcome of checking a source transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Source transaction exists and matches.
    Valid(VerifiedDetails),
    /// Source transaction is missing or does not match.
    Invalid(String),
    /// Source ledger could not be consulted; retry later.
    Unavailable,
}

/// Capability for verifying a source-ledger transaction.
pub trait Verifier {
    fn verify(&self, source_tx_id: &str) -> VerificationOutcome;
}

/// A verification that was already resolved by the caller.
///
/// The relay service checks the source ledger asynchronously and hands the
/// registry the resolved outcome, keeping registry operations synchronous.
#[derive(Debug, Clone)]
pub struct ResolvedVerification(pub VerificationOutcome);

impl ResolvedVerification {
    pub fn valid(confirmations: u32) -> Self {
        Self(VerificationOutcome::Valid(VerifiedDetails { confirmations }))
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self(VerificationOutcome::Invalid(reason.into()))
    }

    pub fn unavailable() -> Self {
        Self(VerificationOutcome::Unavailable)
    }
}

impl Verifier for ResolvedVerification {
    fn verify(&self, _source_tx_id: &str) -> VerificationOutcome {
        self.0.clone()
    }
}
