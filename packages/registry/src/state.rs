//! Registry state
//!
//! All bridge state lives in one explicit, caller-owned struct. Operations in
//! `registry` take `&mut RegistryState` and run validate-then-mutate, so each
//! call is all-or-nothing under the host's serial execution guarantee.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::RegistryError;
use crate::fees::BPS_DENOMINATOR;
use crate::types::{AccountId, AssetId, BridgeTransaction};

/// Registry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Owner account for administrative operations.
    pub owner: AccountId,
    /// Custody account holding locked funds.
    pub custody: AccountId,
    /// Account receiving bridge fees.
    pub fee_collector: AccountId,
    /// Fee rate in basis points, e.g. 10 = 0.1%.
    pub fee_rate_bps: u32,
    /// Upper bound an admin may set `fee_rate_bps` to.
    pub max_fee_rate_bps: u32,
    /// Minimum transfer amount in base units, inclusive.
    pub min_transfer_amount: u128,
    /// Maximum transfer amount in base units, inclusive.
    pub max_transfer_amount: u128,
    /// Source confirmations required before a payout.
    pub confirmation_threshold: u32,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.confirmation_threshold == 0 {
            return Err(RegistryError::InvalidConfig(
                "confirmation_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_fee_rate_bps as u128 > BPS_DENOMINATOR {
            return Err(RegistryError::InvalidConfig(format!(
                "max_fee_rate_bps {} exceeds {}",
                self.max_fee_rate_bps, BPS_DENOMINATOR
            )));
        }
        if self.fee_rate_bps > self.max_fee_rate_bps {
            return Err(RegistryError::InvalidConfig(format!(
                "fee_rate_bps {} exceeds max_fee_rate_bps {}",
                self.fee_rate_bps, self.max_fee_rate_bps
            )));
        }
        if self.min_transfer_amount == 0 {
            return Err(RegistryError::InvalidConfig(
                "min_transfer_amount must be positive".to_string(),
            ));
        }
        if self.min_transfer_amount > self.max_transfer_amount {
            return Err(RegistryError::InvalidConfig(format!(
                "min_transfer_amount {} exceeds max_transfer_amount {}",
                self.min_transfer_amount, self.max_transfer_amount
            )));
        }
        Ok(())
    }
}

/// Running operation counters and fee accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_locks: u64,
    pub total_burns: u64,
    pub total_unlocks: u64,
    pub total_mints: u64,
    pub total_rejections: u64,
    /// Sum of all fees credited to the collector, in base units.
    pub total_fees_collected: u128,
}

/// The complete bridge registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryState {
    pub config: RegistryConfig,
    pub paused: bool,
    /// Assets allowed to cross the bridge.
    pub supported_assets: BTreeSet<AssetId>,
    /// Identities allowed to call `unlock`/`mint`/`reject`.
    pub authorized_validators: BTreeSet<AccountId>,
    /// Ledger B balances, keyed (account, asset). Custody and the fee
    /// collector are ordinary accounts in this map.
    pub balances: BTreeMap<(AccountId, AssetId), u128>,
    /// Transaction history keyed by id. Append-only; records are never
    /// removed, only driven to a terminal status.
    pub transactions: BTreeMap<String, BridgeTransaction>,
    pub stats: RegistryStats,
}

impl RegistryState {
    /// Create a registry with an empty ledger and no allowlist entries.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self {
            config,
            paused: false,
            supported_assets: BTreeSet::new(),
            authorized_validators: BTreeSet::new(),
            balances: BTreeMap::new(),
            transactions: BTreeMap::new(),
            stats: RegistryStats::default(),
        })
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Custody balance for one asset.
    pub fn custody_balance(&self, asset: &AssetId) -> u128 {
        self.balances
            .get(&(self.config.custody.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn transaction(&self, id: &str) -> Option<&BridgeTransaction> {
        self.transactions.get(id)
    }

    pub fn is_asset_supported(&self, asset: &AssetId) -> bool {
        self.supported_assets.contains(asset)
    }

    pub fn is_authorized_validator(&self, id: &AccountId) -> bool {
        self.authorized_validators.contains(id)
    }

    /// Directly credit an account. Used by genesis seeding and tests; live
    /// balance movement goes through the registry operations.
    pub fn credit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) {
        if amount == 0 {
            return;
        }
        *self
            .balances
            .entry((account.clone(), asset.clone()))
            .or_insert(0) += amount;
    }

    /// Debit an account, failing without mutation if the balance is short.
    pub(crate) fn debit(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), RegistryError> {
        let have = self.balance(account, asset);
        if have < amount {
            return Err(RegistryError::InsufficientFunds {
                account: account.clone(),
                asset: asset.clone(),
                have,
                need: amount,
            });
        }
        self.balances
            .insert((account.clone(), asset.clone()), have - amount);
        Ok(())
    }

    pub(crate) fn ensure_not_paused(&self) -> Result<(), RegistryError> {
        if self.paused {
            return Err(RegistryError::Paused);
        }
        Ok(())
    }

    pub(crate) fn ensure_owner(&self, caller: &AccountId) -> Result<(), RegistryError> {
        if caller != &self.config.owner {
            return Err(RegistryError::UnauthorizedOwner(caller.clone()));
        }
        Ok(())
    }

    pub(crate) fn ensure_validator(&self, caller: &AccountId) -> Result<(), RegistryError> {
        if !self.is_authorized_validator(caller) {
            return Err(RegistryError::UnauthorizedValidator(caller.clone()));
        }
        Ok(())
    }

    pub(crate) fn ensure_supported(&self, asset: &AssetId) -> Result<(), RegistryError> {
        if !self.is_asset_supported(asset) {
            return Err(RegistryError::UnsupportedAsset(asset.clone()));
        }
        Ok(())
    }

    pub(crate) fn ensure_amount_in_bounds(&self, amount: u128) -> Result<(), RegistryError> {
        if amount < self.config.min_transfer_amount || amount > self.config.max_transfer_amount {
            return Err(RegistryError::AmountOutOfBounds {
                amount,
                min: self.config.min_transfer_amount,
                max: self.config.max_transfer_amount,
            });
        }
        Ok(())
    }

    /// A transaction id may be processed at most once; any terminal record
    /// blocks re-use.
    pub(crate) fn ensure_not_terminal(&self, id: &str) -> Result<(), RegistryError> {
        if let Some(tx) = self.transactions.get(id) {
            if tx.status.is_terminal() {
                return Err(RegistryError::DuplicateTransaction(id.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RegistryConfig {
        RegistryConfig {
            owner: AccountId::new("owner"),
            custody: AccountId::new("custody"),
            fee_collector: AccountId::new("collector"),
            fee_rate_bps: 10,
            max_fee_rate_bps: 100,
            min_transfer_amount: 10,
            max_transfer_amount: 1_000_000,
            confirmation_threshold: 3,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());

        let mut c = config();
        c.confirmation_threshold = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.fee_rate_bps = 200; // above max_fee_rate_bps
        assert!(c.validate().is_err());

        let mut c = config();
        c.min_transfer_amount = 2_000_000;
        assert!(c.validate().is_err());

        let mut c = config();
        c.max_fee_rate_bps = 10_001;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_debit_requires_balance() {
        let mut state = RegistryState::new(config()).unwrap();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");

        let err = state.debit(&alice, &asset, 5).unwrap_err();
        assert!(matches!(err, RegistryError::InsufficientFunds { .. }));

        state.credit(&alice, &asset, 10);
        state.debit(&alice, &asset, 5).unwrap();
        assert_eq!(state.balance(&alice, &asset), 5);
    }

    #[test]
    fn test_zero_credit_creates_no_entry() {
        let mut state = RegistryState::new(config()).unwrap();
        state.credit(&AccountId::new("alice"), &AssetId::new("XLN"), 0);
        assert!(state.balances.is_empty());
    }
}
