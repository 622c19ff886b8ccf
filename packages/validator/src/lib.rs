//! Crosslane Validator Relay Service
//!
//! The off-ledger half of the bridge: watches pending transfers, verifies
//! their source transactions through ledger connectors, and drives the
//! registry to a terminal decision once the confirmation threshold is met.
//! An HTTP API exposes submissions, lookups, and the validator control plane.

pub mod api;
pub mod audit;
pub mod clock;
pub mod config;
pub mod connectors;
pub mod error;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod relay;
pub mod retry;

pub use config::Config;
pub use error::RelayError;
pub use relay::RelayService;
