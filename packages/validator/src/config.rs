//! Validator service configuration
//!
//! Loaded from environment variables (with optional .env file). Runtime-
//! mutable validator policy lives in [`ValidatorPolicy`] and can be updated
//! through the API; everything else is fixed at startup.

use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;

use crosslane_registry::AccountId;

/// Main configuration for the validator service.
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_a: LedgerConfig,
    pub ledger_b: LedgerConfig,
    pub validator: ValidatorConfig,
    pub api: ApiConfig,
}

/// Connection settings for one ledger endpoint.
#[derive(Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger's HTTP API.
    pub endpoint: String,
    /// Bridge custody (door) account on this ledger.
    pub custody_account: String,
    /// Secret used to sign submissions on this ledger.
    pub signing_secret: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

/// Custom Debug that redacts the signing secret.
impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("endpoint", &self.endpoint)
            .field("custody_account", &self.custody_account)
            .field("signing_secret", &"<redacted>")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Fixed validator identity and loop settings.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// This validator's identity, as registered with the registry.
    pub validator_id: AccountId,
    /// Registry owner account (administrative operations).
    pub owner: AccountId,
    /// Fee collector account on Ledger B.
    pub fee_collector: AccountId,
    /// Assets enabled at startup.
    pub supported_assets: Vec<String>,
    pub poll_interval_ms: u64,
    /// Start the relay loop immediately at boot.
    pub auto_start: bool,
    /// Initial runtime policy.
    pub policy: ValidatorPolicy,
}

/// Runtime-mutable relay policy, read on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPolicy {
    /// Confirmations required before auto-processing, at least 1.
    pub confirmation_threshold: u32,
    /// Process transfers automatically once confirmed.
    pub auto_process: bool,
    /// Fee rate applied by the registry, in basis points.
    pub fee_rate_bps: u32,
    /// Cap for `fee_rate_bps` updates.
    pub max_fee_rate_bps: u32,
    pub min_transfer_amount: u128,
    pub max_transfer_amount: u128,
    /// Failed source verifications tolerated before rejecting a transfer.
    pub max_verification_attempts: u32,
}

impl ValidatorPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.confirmation_threshold == 0 {
            return Err("confirmation_threshold must be at least 1".to_string());
        }
        if self.fee_rate_bps > self.max_fee_rate_bps {
            return Err(format!(
                "fee_rate_bps {} exceeds max_fee_rate_bps {}",
                self.fee_rate_bps, self.max_fee_rate_bps
            ));
        }
        if self.max_fee_rate_bps > 10_000 {
            return Err(format!(
                "max_fee_rate_bps {} exceeds 10000",
                self.max_fee_rate_bps
            ));
        }
        if self.min_transfer_amount == 0 {
            return Err("min_transfer_amount must be positive".to_string());
        }
        if self.min_transfer_amount > self.max_transfer_amount {
            return Err(format!(
                "min_transfer_amount {} exceeds max_transfer_amount {}",
                self.min_transfer_amount, self.max_transfer_amount
            ));
        }
        if self.max_verification_attempts == 0 {
            return Err("max_verification_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Partial policy update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyUpdate {
    pub confirmation_threshold: Option<u32>,
    pub auto_process: Option<bool>,
    pub fee_rate_bps: Option<u32>,
    pub min_transfer_amount: Option<u128>,
    pub max_transfer_amount: Option<u128>,
    pub max_verification_attempts: Option<u32>,
}

impl ValidatorPolicy {
    /// Merge a partial update, validating the result before applying.
    pub fn merged(&self, update: &PolicyUpdate) -> Result<ValidatorPolicy, String> {
        let next = ValidatorPolicy {
            confirmation_threshold: update
                .confirmation_threshold
                .unwrap_or(self.confirmation_threshold),
            auto_process: update.auto_process.unwrap_or(self.auto_process),
            fee_rate_bps: update.fee_rate_bps.unwrap_or(self.fee_rate_bps),
            max_fee_rate_bps: self.max_fee_rate_bps,
            min_transfer_amount: update
                .min_transfer_amount
                .unwrap_or(self.min_transfer_amount),
            max_transfer_amount: update
                .max_transfer_amount
                .unwrap_or(self.max_transfer_amount),
            max_verification_attempts: update
                .max_verification_attempts
                .unwrap_or(self.max_verification_attempts),
        };
        next.validate()?;
        Ok(next)
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Default functions
fn default_poll_interval() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_confirmation_threshold() -> u32 {
    3
}

fn default_fee_rate_bps() -> u32 {
    30
}

fn default_max_fee_rate_bps() -> u32 {
    1_000
}

fn default_max_verification_attempts() -> u32 {
    5
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables, reading .env if present.
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path.
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let ledger_a = LedgerConfig {
            endpoint: env::var("LEDGER_A_ENDPOINT")
                .map_err(|_| eyre!("LEDGER_A_ENDPOINT environment variable is required"))?,
            custody_account: env::var("LEDGER_A_CUSTODY_ACCOUNT")
                .map_err(|_| eyre!("LEDGER_A_CUSTODY_ACCOUNT environment variable is required"))?,
            signing_secret: env::var("LEDGER_A_SIGNING_SECRET")
                .map_err(|_| eyre!("LEDGER_A_SIGNING_SECRET environment variable is required"))?,
            request_timeout_ms: env::var("LEDGER_A_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_request_timeout()),
        };

        let ledger_b = LedgerConfig {
            endpoint: env::var("LEDGER_B_ENDPOINT")
                .map_err(|_| eyre!("LEDGER_B_ENDPOINT environment variable is required"))?,
            custody_account: env::var("LEDGER_B_CUSTODY_ACCOUNT")
                .map_err(|_| eyre!("LEDGER_B_CUSTODY_ACCOUNT environment variable is required"))?,
            signing_secret: env::var("LEDGER_B_SIGNING_SECRET")
                .map_err(|_| eyre!("LEDGER_B_SIGNING_SECRET environment variable is required"))?,
            request_timeout_ms: env::var("LEDGER_B_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_request_timeout()),
        };

        let policy = ValidatorPolicy {
            confirmation_threshold: env::var("CONFIRMATION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirmation_threshold()),
            auto_process: env::var("AUTO_PROCESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            fee_rate_bps: env::var("FEE_RATE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_fee_rate_bps()),
            max_fee_rate_bps: env::var("MAX_FEE_RATE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_max_fee_rate_bps()),
            min_transfer_amount: env::var("MIN_TRANSFER_AMOUNT")
                .map_err(|_| eyre!("MIN_TRANSFER_AMOUNT environment variable is required"))?
                .parse()
                .wrap_err("MIN_TRANSFER_AMOUNT must be a valid u128")?,
            max_transfer_amount: env::var("MAX_TRANSFER_AMOUNT")
                .map_err(|_| eyre!("MAX_TRANSFER_AMOUNT environment variable is required"))?
                .parse()
                .wrap_err("MAX_TRANSFER_AMOUNT must be a valid u128")?,
            max_verification_attempts: env::var("MAX_VERIFICATION_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_max_verification_attempts()),
        };

        let validator = ValidatorConfig {
            validator_id: AccountId::new(
                env::var("VALIDATOR_ID")
                    .map_err(|_| eyre!("VALIDATOR_ID environment variable is required"))?,
            ),
            owner: AccountId::new(
                env::var("REGISTRY_OWNER")
                    .map_err(|_| eyre!("REGISTRY_OWNER environment variable is required"))?,
            ),
            fee_collector: AccountId::new(
                env::var("FEE_COLLECTOR")
                    .map_err(|_| eyre!("FEE_COLLECTOR environment variable is required"))?,
            ),
            supported_assets: env::var("SUPPORTED_ASSETS")
                .map_err(|_| eyre!("SUPPORTED_ASSETS environment variable is required"))?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_poll_interval()),
            auto_start: env::var("AUTO_START")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            policy,
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_api_port()),
        };

        let config = Config {
            ledger_a,
            ledger_b,
            validator,
            api,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ledger_a.endpoint.is_empty() {
            return Err(eyre!("ledger_a.endpoint cannot be empty"));
        }
        if self.ledger_b.endpoint.is_empty() {
            return Err(eyre!("ledger_b.endpoint cannot be empty"));
        }
        if self.ledger_a.custody_account.is_empty() {
            return Err(eyre!("ledger_a.custody_account cannot be empty"));
        }
        if self.ledger_b.custody_account.is_empty() {
            return Err(eyre!("ledger_b.custody_account cannot be empty"));
        }
        if self.validator.validator_id.as_str().is_empty() {
            return Err(eyre!("validator_id cannot be empty"));
        }
        if self.validator.supported_assets.is_empty() {
            return Err(eyre!("SUPPORTED_ASSETS must list at least one asset"));
        }
        if self.validator.poll_interval_ms == 0 {
            return Err(eyre!("poll_interval_ms must be positive"));
        }
        self.validator
            .policy
            .validate()
            .map_err(|e| eyre!("invalid validator policy: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ValidatorPolicy {
        ValidatorPolicy {
            confirmation_threshold: 3,
            auto_process: true,
            fee_rate_bps: 30,
            max_fee_rate_bps: 1_000,
            min_transfer_amount: 10,
            max_transfer_amount: 1_000_000,
            max_verification_attempts: 5,
        }
    }

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(default_poll_interval(), 1000);
    }

    #[test]
    fn test_default_confirmation_threshold() {
        assert_eq!(default_confirmation_threshold(), 3);
    }

    #[test]
    fn test_default_fee_rate_bps() {
        assert_eq!(default_fee_rate_bps(), 30);
    }

    #[test]
    fn test_policy_validation() {
        assert!(policy().validate().is_ok());

        let mut p = policy();
        p.confirmation_threshold = 0;
        assert!(p.validate().is_err());

        let mut p = policy();
        p.fee_rate_bps = 2_000; // above max
        assert!(p.validate().is_err());

        let mut p = policy();
        p.min_transfer_amount = 2_000_000;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_policy_merge_keeps_unset_fields() {
        let base = policy();
        let next = base
            .merged(&PolicyUpdate {
                confirmation_threshold: Some(5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.confirmation_threshold, 5);
        assert_eq!(next.fee_rate_bps, base.fee_rate_bps);
        assert_eq!(next.auto_process, base.auto_process);
    }

    #[test]
    fn test_policy_merge_rejects_invalid_combination() {
        let base = policy();
        let err = base
            .merged(&PolicyUpdate {
                confirmation_threshold: Some(0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.contains("confirmation_threshold"));

        // Rate above the fixed cap is rejected before merge.
        assert!(base
            .merged(&PolicyUpdate {
                fee_rate_bps: Some(5_000),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_ledger_config_debug_redacts_secret() {
        let cfg = LedgerConfig {
            endpoint: "http://localhost:5005".to_string(),
            custody_account: "rBridgeDoor".to_string(),
            signing_secret: "sEdVerySecret".to_string(),
            request_timeout_ms: 30_000,
        };
        let debug = format!("{:?}", cfg);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("sEdVerySecret"));
    }
}
