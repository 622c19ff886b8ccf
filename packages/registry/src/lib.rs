//! Crosslane Bridge Registry
//!
//! The authoritative state machine for cross-ledger transfers: lock/burn on
//! the way out, validator-authorized unlock/mint on the way in, with fee
//! accounting, asset and validator allowlists, and an append-only transaction
//! history.
//!
//! The registry holds no global state. Construct a [`state::RegistryState`]
//! and call operations on it; each call either fully applies or returns an
//! error with nothing mutated.

pub mod error;
pub mod fees;
pub mod hash;
pub mod registry;
pub mod state;
pub mod types;
pub mod verify;

pub use error::RegistryError;
pub use registry::Payout;
pub use state::{RegistryConfig, RegistryState, RegistryStats};
pub use types::{AccountId, AssetId, BridgeTransaction, Direction, TxStatus};
pub use verify::{ResolvedVerification, VerificationOutcome, VerifiedDetails, Verifier};
