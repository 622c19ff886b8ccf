//! Registry operations
//!
//! The four core operations (`lock`, `burn`, `unlock`, `mint`) plus the
//! administrative surface. Every function validates the full call before the
//! first mutation, so a returned error means nothing changed.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::fees;
use crate::hash;
use crate::state::RegistryState;
use crate::types::{AccountId, AssetId, BridgeTransaction, Direction, TxStatus};
use crate::verify::{VerificationOutcome, Verifier};

/// The result of a successful validator payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub tx_id: String,
    pub asset: AssetId,
    pub recipient: AccountId,
    pub net_amount: u128,
    pub fee: u128,
}

impl RegistryState {
    /// Lock funds into custody, recording a Pending withdrawal-direction
    /// transaction: the value will leave this ledger once a validator calls
    /// `unlock`. Returns the new transaction id.
    ///
    /// The caller's gross amount is split: net into custody, fee to the
    /// collector.
    pub fn lock(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
        amount: u128,
        dest_on_a: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        self.ensure_not_paused()?;
        self.ensure_supported(asset)?;
        self.ensure_amount_in_bounds(amount)?;
        let split = fees::split(amount, self.config.fee_rate_bps)?;
        let id = hash::content_id(caller, asset, amount, dest_on_a, now);
        if self.transactions.contains_key(&id) {
            return Err(RegistryError::DuplicateTransaction(id));
        }
        self.debit(caller, asset, amount)?;

        let custody = self.config.custody.clone();
        let collector = self.config.fee_collector.clone();
        self.credit(&custody, asset, split.net);
        self.credit(&collector, asset, split.fee);

        self.transactions.insert(
            id.clone(),
            BridgeTransaction {
                id: id.clone(),
                direction: Direction::Withdrawal,
                source_address: caller.clone(),
                dest_address: dest_on_a.clone(),
                asset: asset.clone(),
                gross_amount: split.gross,
                fee: split.fee,
                net_amount: split.net,
                status: TxStatus::Pending,
                custody_held: true,
                confirmations: 0,
                created_at: now,
                processed_at: None,
                reject_reason: None,
            },
        );
        self.stats.total_locks += 1;
        self.stats.total_fees_collected += split.fee;

        info!(tx_id = %id, caller = %caller, asset = %asset, gross = amount,
              fee = split.fee, "locked funds into custody");
        Ok(id)
    }

    /// Burn the caller's balance, recording a Pending withdrawal-direction
    /// transaction keyed by the caller's source transaction hash. A second
    /// burn for the same hash fails with `DuplicateTransaction`, so client
    /// retries never double-spend. Returns the transaction id.
    pub fn burn(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
        amount: u128,
        dest_on_a: &AccountId,
        source_tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        self.ensure_not_paused()?;
        self.ensure_supported(asset)?;
        self.ensure_amount_in_bounds(amount)?;
        let split = fees::split(amount, self.config.fee_rate_bps)?;
        let id = source_tx_hash.to_string();
        if self.transactions.contains_key(&id) {
            return Err(RegistryError::DuplicateTransaction(id));
        }
        // Gross leaves the caller; net is destroyed, fee goes to the collector.
        self.debit(caller, asset, amount)?;
        let collector = self.config.fee_collector.clone();
        self.credit(&collector, asset, split.fee);

        self.transactions.insert(
            id.clone(),
            BridgeTransaction {
                id: id.clone(),
                direction: Direction::Withdrawal,
                source_address: caller.clone(),
                dest_address: dest_on_a.clone(),
                asset: asset.clone(),
                gross_amount: split.gross,
                fee: split.fee,
                net_amount: split.net,
                status: TxStatus::Pending,
                custody_held: false,
                confirmations: 0,
                created_at: now,
                processed_at: None,
                reject_reason: None,
            },
        );
        self.stats.total_burns += 1;
        self.stats.total_fees_collected += split.fee;

        info!(tx_id = %id, caller = %caller, asset = %asset, gross = amount,
              fee = split.fee, "burned funds for withdrawal");
        Ok(id)
    }

    /// Authorize the outbound payout for a lock- or burn-created transaction
    /// after source verification. Validator-only.
    ///
    /// For a lock-created record the custody account is debited by the net
    /// amount (the value leaves this ledger); a shortfall is a fatal
    /// accounting error. For a burn-created record the funds were already
    /// destroyed, so no balance moves. Either way the record becomes
    /// Processed and the returned [`Payout`] names the recipient and net
    /// amount the validator must deliver on the other ledger.
    pub fn unlock(
        &mut self,
        validator: &AccountId,
        tx_id: &str,
        asset: &AssetId,
        amount: u128,
        dest: &AccountId,
        verifier: &dyn Verifier,
        now: DateTime<Utc>,
    ) -> Result<Payout, RegistryError> {
        let split = self.authorize_payout(validator, tx_id, asset, amount, verifier)?;

        // The fee for a lock- or burn-created record was already collected
        // when the record was created, so the stored split wins over a
        // recomputed one if the fee rate changed in between.
        let (split, needs_custody_release) = match self.transactions.get(tx_id) {
            Some(tx) => {
                if tx.gross_amount != amount {
                    return Err(RegistryError::AmountMismatch {
                        expected: tx.gross_amount,
                        actual: amount,
                    });
                }
                let recorded = fees::FeeSplit {
                    gross: tx.gross_amount,
                    fee: tx.fee,
                    net: tx.net_amount,
                };
                (recorded, tx.custody_held)
            }
            // Off-registry source: treat like a lock release.
            None => (split, true),
        };

        if needs_custody_release {
            let custody = self.config.custody.clone();
            let have = self.balance(&custody, asset);
            if have < split.net {
                warn!(tx_id, asset = %asset, have, need = split.net,
                      "custody shortfall on unlock, refusing payout");
                return Err(RegistryError::InsufficientCustody {
                    asset: asset.clone(),
                    have,
                    need: split.net,
                });
            }
            // Value leaves this ledger toward the recipient on the other side.
            self.debit(&custody, asset, split.net)?;
        }

        match self.transactions.get_mut(tx_id) {
            Some(tx) => {
                tx.status = TxStatus::Processed;
                tx.custody_held = false;
                tx.processed_at = Some(now);
            }
            None => {
                let collector = self.config.fee_collector.clone();
                self.credit(&collector, asset, split.fee);
                self.stats.total_fees_collected += split.fee;
                self.transactions.insert(
                    tx_id.to_string(),
                    BridgeTransaction {
                        id: tx_id.to_string(),
                        direction: Direction::Withdrawal,
                        source_address: AccountId::new(""),
                        dest_address: dest.clone(),
                        asset: asset.clone(),
                        gross_amount: split.gross,
                        fee: split.fee,
                        net_amount: split.net,
                        status: TxStatus::Processed,
                        custody_held: false,
                        confirmations: self.config.confirmation_threshold,
                        created_at: now,
                        processed_at: Some(now),
                        reject_reason: None,
                    },
                );
            }
        }
        self.stats.total_unlocks += 1;

        info!(tx_id, validator = %validator, recipient = %dest,
              net = split.net, "authorized outbound payout");
        Ok(Payout {
            tx_id: tx_id.to_string(),
            asset: asset.clone(),
            recipient: dest.clone(),
            net_amount: split.net,
            fee: split.fee,
        })
    }

    /// Mint funds to a recipient after a verified source-side lock.
    /// Validator-only. No custody debit; supply is created on this side.
    pub fn mint(
        &mut self,
        validator: &AccountId,
        tx_id: &str,
        asset: &AssetId,
        amount: u128,
        dest_on_b: &AccountId,
        verifier: &dyn Verifier,
        now: DateTime<Utc>,
    ) -> Result<Payout, RegistryError> {
        let split = self.authorize_payout(validator, tx_id, asset, amount, verifier)?;

        self.finish_payout(tx_id, Direction::Deposit, asset, dest_on_b, split, now);
        self.stats.total_mints += 1;

        info!(tx_id, validator = %validator, recipient = %dest_on_b,
              net = split.net, "minted funds for deposit");
        Ok(Payout {
            tx_id: tx_id.to_string(),
            asset: asset.clone(),
            recipient: dest_on_b.clone(),
            net_amount: split.net,
            fee: split.fee,
        })
    }

    /// Shared validation for `unlock`/`mint`: pause, validator auth, asset,
    /// bounds, duplicate guard, and source verification.
    fn authorize_payout(
        &self,
        validator: &AccountId,
        tx_id: &str,
        asset: &AssetId,
        amount: u128,
        verifier: &dyn Verifier,
    ) -> Result<fees::FeeSplit, RegistryError> {
        self.ensure_not_paused()?;
        self.ensure_validator(validator)?;
        self.ensure_supported(asset)?;
        self.ensure_amount_in_bounds(amount)?;
        self.ensure_not_terminal(tx_id)?;

        match verifier.verify(tx_id) {
            VerificationOutcome::Valid(details) => {
                if details.confirmations < self.config.confirmation_threshold {
                    return Err(RegistryError::VerificationFailed(format!(
                        "{} confirmations, need {}",
                        details.confirmations, self.config.confirmation_threshold
                    )));
                }
            }
            VerificationOutcome::Invalid(reason) => {
                return Err(RegistryError::VerificationFailed(reason));
            }
            VerificationOutcome::Unavailable => {
                return Err(RegistryError::VerificationUnavailable);
            }
        }

        fees::split(amount, self.config.fee_rate_bps)
    }

    /// Credit the recipient and collector, then mark (or create) the
    /// transaction record as Processed.
    fn finish_payout(
        &mut self,
        tx_id: &str,
        direction: Direction,
        asset: &AssetId,
        recipient: &AccountId,
        split: fees::FeeSplit,
        now: DateTime<Utc>,
    ) {
        self.credit(recipient, asset, split.net);
        let collector = self.config.fee_collector.clone();
        self.credit(&collector, asset, split.fee);
        self.stats.total_fees_collected += split.fee;

        match self.transactions.get_mut(tx_id) {
            Some(tx) => {
                tx.status = TxStatus::Processed;
                tx.processed_at = Some(now);
                tx.dest_address = recipient.clone();
                tx.gross_amount = split.gross;
                tx.fee = split.fee;
                tx.net_amount = split.net;
            }
            None => {
                // First time the registry sees this id: the transfer was
                // observed off-registry by the relay service.
                self.transactions.insert(
                    tx_id.to_string(),
                    BridgeTransaction {
                        id: tx_id.to_string(),
                        direction,
                        source_address: AccountId::new(""),
                        dest_address: recipient.clone(),
                        asset: asset.clone(),
                        gross_amount: split.gross,
                        fee: split.fee,
                        net_amount: split.net,
                        status: TxStatus::Processed,
                        custody_held: false,
                        confirmations: self.config.confirmation_threshold,
                        created_at: now,
                        processed_at: Some(now),
                        reject_reason: None,
                    },
                );
            }
        }
    }

    /// Mark a transaction Rejected. Validator-only; never touches balances.
    /// Creates the record when the registry never saw the id, so the terminal
    /// outcome is always on file.
    pub fn reject(
        &mut self,
        validator: &AccountId,
        tx_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.ensure_not_paused()?;
        self.ensure_validator(validator)?;
        self.ensure_not_terminal(tx_id)?;

        match self.transactions.get_mut(tx_id) {
            Some(tx) => {
                tx.status = TxStatus::Rejected;
                tx.processed_at = Some(now);
                tx.reject_reason = Some(reason.to_string());
            }
            None => {
                self.transactions.insert(
                    tx_id.to_string(),
                    BridgeTransaction {
                        id: tx_id.to_string(),
                        direction: Direction::Deposit,
                        source_address: AccountId::new(""),
                        dest_address: AccountId::new(""),
                        asset: AssetId::new(""),
                        gross_amount: 0,
                        fee: 0,
                        net_amount: 0,
                        status: TxStatus::Rejected,
                        custody_held: false,
                        confirmations: 0,
                        created_at: now,
                        processed_at: Some(now),
                        reject_reason: Some(reason.to_string()),
                    },
                );
            }
        }
        self.stats.total_rejections += 1;

        info!(tx_id, validator = %validator, reason, "rejected transaction");
        Ok(())
    }

    /// Record fresh source-ledger confirmations for a non-terminal
    /// transaction. Confirmations never decrease.
    pub fn record_confirmations(
        &mut self,
        tx_id: &str,
        confirmations: u32,
    ) -> Result<u32, RegistryError> {
        let tx = self
            .transactions
            .get_mut(tx_id)
            .ok_or_else(|| RegistryError::UnknownTransaction(tx_id.to_string()))?;
        if tx.status.is_terminal() {
            return Err(RegistryError::DuplicateTransaction(tx_id.to_string()));
        }
        tx.confirmations = tx.confirmations.max(confirmations);
        Ok(tx.confirmations)
    }

    /// Move a Pending transaction to Verified once its source checks passed.
    pub fn mark_verified(&mut self, tx_id: &str) -> Result<(), RegistryError> {
        let tx = self
            .transactions
            .get_mut(tx_id)
            .ok_or_else(|| RegistryError::UnknownTransaction(tx_id.to_string()))?;
        if tx.status.is_terminal() {
            return Err(RegistryError::DuplicateTransaction(tx_id.to_string()));
        }
        tx.status = TxStatus::Verified;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Administrative operations (owner-only)
    // ------------------------------------------------------------------

    pub fn add_supported_asset(
        &mut self,
        caller: &AccountId,
        asset: AssetId,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        info!(asset = %asset, "asset added to allowlist");
        self.supported_assets.insert(asset);
        Ok(())
    }

    pub fn remove_supported_asset(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        if !self.supported_assets.remove(asset) {
            return Err(RegistryError::UnsupportedAsset(asset.clone()));
        }
        info!(asset = %asset, "asset removed from allowlist");
        Ok(())
    }

    pub fn authorize_validator(
        &mut self,
        caller: &AccountId,
        validator: AccountId,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        info!(validator = %validator, "validator authorized");
        self.authorized_validators.insert(validator);
        Ok(())
    }

    pub fn revoke_validator(
        &mut self,
        caller: &AccountId,
        validator: &AccountId,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        if !self.authorized_validators.remove(validator) {
            return Err(RegistryError::UnauthorizedValidator(validator.clone()));
        }
        info!(validator = %validator, "validator revoked");
        Ok(())
    }

    /// Update policy parameters. The whole update is validated before any
    /// field is applied.
    pub fn set_config(
        &mut self,
        caller: &AccountId,
        fee_rate_bps: u32,
        min_transfer_amount: u128,
        max_transfer_amount: u128,
        confirmation_threshold: u32,
    ) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        let mut next = self.config.clone();
        next.fee_rate_bps = fee_rate_bps;
        next.min_transfer_amount = min_transfer_amount;
        next.max_transfer_amount = max_transfer_amount;
        next.confirmation_threshold = confirmation_threshold;
        next.validate()?;
        self.config = next;
        info!(
            fee_rate_bps,
            min_transfer_amount, max_transfer_amount, confirmation_threshold,
            "registry configuration updated"
        );
        Ok(())
    }

    /// Circuit breaker: while paused every state-changing operation fails
    /// fast with `Paused`.
    pub fn pause(&mut self, caller: &AccountId) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        if self.paused {
            return Err(RegistryError::Paused);
        }
        self.paused = true;
        warn!("registry paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: &AccountId) -> Result<(), RegistryError> {
        self.ensure_owner(caller)?;
        if !self.paused {
            return Err(RegistryError::NotPaused);
        }
        self.paused = false;
        info!("registry unpaused");
        Ok(())
    }

    /// Owner escape hatch: drain the custody balance of one asset to the
    /// owner. Only allowed while paused.
    pub fn emergency_withdraw(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, RegistryError> {
        self.ensure_owner(caller)?;
        if !self.paused {
            return Err(RegistryError::NotPaused);
        }
        let custody = self.config.custody.clone();
        let owner = self.config.owner.clone();
        let amount = self.balance(&custody, asset);
        self.debit(&custody, asset, amount)?;
        self.credit(&owner, asset, amount);
        warn!(asset = %asset, amount, "emergency withdrawal of custody funds");
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RegistryConfig;
    use crate::verify::ResolvedVerification;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn registry() -> RegistryState {
        let mut state = RegistryState::new(RegistryConfig {
            owner: AccountId::new("owner"),
            custody: AccountId::new("custody"),
            fee_collector: AccountId::new("collector"),
            fee_rate_bps: 10,
            max_fee_rate_bps: 100,
            min_transfer_amount: 10,
            max_transfer_amount: 1_000_000,
            confirmation_threshold: 3,
        })
        .unwrap();
        let owner = AccountId::new("owner");
        state
            .add_supported_asset(&owner, AssetId::new("XLN"))
            .unwrap();
        state
            .authorize_validator(&owner, AccountId::new("validator-1"))
            .unwrap();
        state
    }

    #[test]
    fn test_lock_splits_fee_into_custody_and_collector() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);

        let id = state
            .lock(&alice, &asset, 1000, &AccountId::new("rDest"), now())
            .unwrap();

        assert_eq!(state.balance(&alice, &asset), 0);
        assert_eq!(state.custody_balance(&asset), 999);
        assert_eq!(state.balance(&AccountId::new("collector"), &asset), 1);

        let tx = state.transaction(&id).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.confirmations, 0);
        assert_eq!(tx.gross_amount, 1000);
        assert_eq!(tx.fee, 1);
        assert_eq!(tx.net_amount, 999);
    }

    #[test]
    fn test_lock_requires_funds_and_leaves_no_partial_state() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");

        let err = state
            .lock(&alice, &asset, 1000, &AccountId::new("rDest"), now())
            .unwrap_err();
        assert!(matches!(err, RegistryError::InsufficientFunds { .. }));
        assert_eq!(state.custody_balance(&asset), 0);
        assert!(state.transactions.is_empty());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 3_000_000);

        assert!(state
            .lock(&alice, &asset, 10, &AccountId::new("r"), now())
            .is_ok());
        assert!(matches!(
            state.lock(&alice, &asset, 9, &AccountId::new("r"), now()),
            Err(RegistryError::AmountOutOfBounds { .. })
        ));
        assert!(state
            .lock(&alice, &asset, 1_000_000, &AccountId::new("r2"), now())
            .is_ok());
        assert!(matches!(
            state.lock(&alice, &asset, 1_000_001, &AccountId::new("r"), now()),
            Err(RegistryError::AmountOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unsupported_asset_fails_before_mutation() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("DOGE");
        state.credit(&alice, &asset, 1000);

        let err = state
            .lock(&alice, &asset, 1000, &AccountId::new("r"), now())
            .unwrap_err();
        assert_eq!(err, RegistryError::UnsupportedAsset(asset.clone()));
        assert_eq!(state.balance(&alice, &asset), 1000);
        assert!(state.transactions.is_empty());
    }

    #[test]
    fn test_burn_destroys_net_and_collects_fee() {
        let mut state = registry();
        let bob = AccountId::new("bob");
        let asset = AssetId::new("XLN");
        state.credit(&bob, &asset, 500);

        let id = state
            .burn(&bob, &asset, 500, &AccountId::new("rBob"), "b-tx-bob-1", now())
            .unwrap();

        assert_eq!(id, "b-tx-bob-1");
        assert_eq!(state.balance(&bob, &asset), 0);
        assert_eq!(state.custody_balance(&asset), 0);
        // 10 bps of 500 truncates to 0
        assert_eq!(state.balance(&AccountId::new("collector"), &asset), 0);
        let tx = state.transaction(&id).unwrap();
        assert_eq!(tx.direction, Direction::Withdrawal);
        assert_eq!(tx.net_amount + tx.fee, tx.gross_amount);
    }

    #[test]
    fn test_burn_refuses_a_reused_source_tx_hash() {
        let mut state = registry();
        let bob = AccountId::new("bob");
        let asset = AssetId::new("XLN");
        state.credit(&bob, &asset, 2000);

        state
            .burn(&bob, &asset, 1000, &AccountId::new("rBob"), "b-tx-7", now())
            .unwrap();
        let err = state
            .burn(
                &bob,
                &asset,
                1000,
                &AccountId::new("rBob"),
                "b-tx-7",
                now() + chrono::Duration::milliseconds(1),
            )
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateTransaction("b-tx-7".into()));
        // The retry debited nothing.
        assert_eq!(state.balance(&bob, &asset), 1000);
        assert_eq!(state.stats.total_burns, 1);
    }

    #[test]
    fn test_unlock_releases_custody_and_is_idempotent() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        let id = state
            .lock(&alice, &asset, 1000, &AccountId::new("rAlice"), now())
            .unwrap();

        let verifier = ResolvedVerification::valid(3);
        let dest = AccountId::new("rAlice");
        let payout = state
            .unlock(&validator, &id, &asset, 1000, &dest, &verifier, now())
            .unwrap();
        // Net leaves custody toward the recipient on the other ledger.
        assert_eq!(payout.net_amount, 999);
        assert_eq!(payout.recipient, dest);
        assert_eq!(state.custody_balance(&asset), 0);
        assert_eq!(state.transaction(&id).unwrap().status, TxStatus::Processed);

        // Second call with the same id fails deterministically, no double payout.
        let err = state
            .unlock(&validator, &id, &asset, 1000, &dest, &verifier, now())
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTransaction(id));
        assert_eq!(state.custody_balance(&asset), 0);
    }

    #[test]
    fn test_unlock_rejects_amount_differing_from_recorded_gross() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        let id = state
            .lock(&alice, &asset, 1000, &AccountId::new("rAlice"), now())
            .unwrap();

        let err = state
            .unlock(
                &validator,
                &id,
                &asset,
                999,
                &AccountId::new("rAlice"),
                &ResolvedVerification::valid(3),
                now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AmountMismatch {
                expected: 1000,
                actual: 999
            }
        );
        // Nothing moved and the record is still payable.
        assert_eq!(state.custody_balance(&asset), 999);
        assert_eq!(state.transaction(&id).unwrap().status, TxStatus::Pending);
    }

    #[test]
    fn test_unlock_requires_validator() {
        let mut state = registry();
        let asset = AssetId::new("XLN");
        let err = state
            .unlock(
                &AccountId::new("mallory"),
                "tx-1",
                &asset,
                1000,
                &AccountId::new("mallory"),
                &ResolvedVerification::valid(3),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnauthorizedValidator(_)));
    }

    #[test]
    fn test_unlock_enforces_confirmation_threshold() {
        let mut state = registry();
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        let custody = state.config.custody.clone();
        state.credit(&custody, &asset, 10_000);

        let err = state
            .unlock(
                &validator,
                "tx-low-conf",
                &asset,
                1000,
                &AccountId::new("carol"),
                &ResolvedVerification::valid(2),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::VerificationFailed(_)));
        assert!(state.transaction("tx-low-conf").is_none());
    }

    #[test]
    fn test_unlock_custody_shortfall_is_fatal_and_not_processed() {
        let mut state = registry();
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        // Custody holds less than the payout needs.
        let custody = state.config.custody.clone();
        state.credit(&custody, &asset, 100);

        let err = state
            .unlock(
                &validator,
                "tx-shortfall",
                &asset,
                1000,
                &AccountId::new("carol"),
                &ResolvedVerification::valid(3),
                now(),
            )
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(state.transaction("tx-shortfall").is_none());
        assert_eq!(state.custody_balance(&asset), 100);
    }

    #[test]
    fn test_mint_creates_record_for_offregistry_id() {
        let mut state = registry();
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        let dest = AccountId::new("dave");

        let payout = state
            .mint(
                &validator,
                "a1b2c3",
                &asset,
                1000,
                &dest,
                &ResolvedVerification::valid(4),
                now(),
            )
            .unwrap();
        assert_eq!(payout.net_amount, 999);
        assert_eq!(state.balance(&dest, &asset), 999);

        let tx = state.transaction("a1b2c3").unwrap();
        assert_eq!(tx.direction, Direction::Deposit);
        assert_eq!(tx.status, TxStatus::Processed);
        assert_eq!(tx.net_amount + tx.fee, tx.gross_amount);

        let err = state
            .mint(
                &validator,
                "a1b2c3",
                &asset,
                1000,
                &dest,
                &ResolvedVerification::valid(4),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTransaction(_)));
    }

    #[test]
    fn test_mint_rejected_by_verifier() {
        let mut state = registry();
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");

        let err = state
            .mint(
                &validator,
                "bad-tx",
                &asset,
                1000,
                &AccountId::new("dave"),
                &ResolvedVerification::invalid("source tx not found"),
                now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::VerificationFailed("source tx not found".to_string())
        );
    }

    #[test]
    fn test_reject_is_terminal_and_touches_no_balance() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let validator = AccountId::new("validator-1");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        let id = state
            .burn(&alice, &asset, 1000, &AccountId::new("rAlice"), "b-tx-1", now())
            .unwrap();
        let custody_before = state.custody_balance(&asset);

        state
            .reject(&validator, &id, "manual operator reject", now())
            .unwrap();

        let tx = state.transaction(&id).unwrap();
        assert_eq!(tx.status, TxStatus::Rejected);
        assert_eq!(tx.reject_reason.as_deref(), Some("manual operator reject"));
        assert_eq!(state.custody_balance(&asset), custody_before);

        // Terminal in both outcomes: no payout after rejection.
        let err = state
            .unlock(
                &validator,
                &id,
                &asset,
                1000,
                &alice,
                &ResolvedVerification::valid(3),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTransaction(_)));
    }

    #[test]
    fn test_confirmations_are_monotonic() {
        let mut state = registry();
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        let id = state
            .lock(&alice, &asset, 1000, &AccountId::new("r"), now())
            .unwrap();

        assert_eq!(state.record_confirmations(&id, 2).unwrap(), 2);
        assert_eq!(state.record_confirmations(&id, 1).unwrap(), 2);
        assert_eq!(state.record_confirmations(&id, 5).unwrap(), 5);
    }

    #[test]
    fn test_paused_fails_fast() {
        let mut state = registry();
        let owner = AccountId::new("owner");
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        state.pause(&owner).unwrap();

        assert_eq!(
            state
                .lock(&alice, &asset, 1000, &AccountId::new("r"), now())
                .unwrap_err(),
            RegistryError::Paused
        );
        assert_eq!(
            state
                .unlock(
                    &AccountId::new("validator-1"),
                    "tx",
                    &asset,
                    1000,
                    &alice,
                    &ResolvedVerification::valid(3),
                    now(),
                )
                .unwrap_err(),
            RegistryError::Paused
        );

        state.unpause(&owner).unwrap();
        assert!(state
            .lock(&alice, &asset, 1000, &AccountId::new("r"), now())
            .is_ok());
    }

    #[test]
    fn test_emergency_withdraw_only_while_paused() {
        let mut state = registry();
        let owner = AccountId::new("owner");
        let alice = AccountId::new("alice");
        let asset = AssetId::new("XLN");
        state.credit(&alice, &asset, 1000);
        state
            .lock(&alice, &asset, 1000, &AccountId::new("r"), now())
            .unwrap();

        assert_eq!(
            state.emergency_withdraw(&owner, &asset).unwrap_err(),
            RegistryError::NotPaused
        );

        state.pause(&owner).unwrap();
        let drained = state.emergency_withdraw(&owner, &asset).unwrap();
        assert_eq!(drained, 999);
        assert_eq!(state.custody_balance(&asset), 0);
        assert_eq!(state.balance(&owner, &asset), 999);
    }

    #[test]
    fn test_admin_ops_require_owner() {
        let mut state = registry();
        let mallory = AccountId::new("mallory");
        assert!(matches!(
            state.add_supported_asset(&mallory, AssetId::new("NEW")),
            Err(RegistryError::UnauthorizedOwner(_))
        ));
        assert!(matches!(
            state.pause(&mallory),
            Err(RegistryError::UnauthorizedOwner(_))
        ));
        assert!(matches!(
            state.set_config(&mallory, 10, 10, 100, 3),
            Err(RegistryError::UnauthorizedOwner(_))
        ));
    }

    #[test]
    fn test_set_config_rejects_fee_above_cap() {
        let mut state = registry();
        let owner = AccountId::new("owner");
        let err = state
            .set_config(&owner, 200, 10, 1_000_000, 3)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
        // Unchanged on failure
        assert_eq!(state.config.fee_rate_bps, 10);
    }
}
