//! In-memory ledger connector for tests and local development
//!
//! Balances, submitted transfers, and per-transaction confirmation counts are
//! all scriptable. A connector can be switched into a failing state to
//! exercise the relay's connectivity handling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crosslane_registry::{AccountId, AssetId};

use super::{ConnectorError, LedgerConnector, NetworkInfo, TransferRequest, TransferStatus};

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<(AccountId, AssetId), u128>,
    /// Scripted status per tx id.
    statuses: HashMap<String, TransferStatus>,
    /// Transfers accepted by submit, keyed by idempotency key.
    submitted: HashMap<String, TransferRequest>,
    /// Submission order, for assertions on payout sequencing.
    submission_log: Vec<String>,
    next_tx_seq: u64,
    /// When true every call fails with a transport error.
    unreachable: bool,
}

#[derive(Debug, Default)]
pub struct MockLedgerConnector {
    name: String,
    state: Mutex<MockState>,
}

impl MockLedgerConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn set_balance(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        let mut state = self.state.lock().expect("mock lock poisoned");
        state
            .balances
            .insert((account.clone(), asset.clone()), amount);
    }

    /// Script the observed status for a tx id.
    pub fn set_status(&self, tx_id: &str, confirmations: u32, valid: bool) {
        let mut state = self.state.lock().expect("mock lock poisoned");
        state.statuses.insert(
            tx_id.to_string(),
            TransferStatus {
                confirmations,
                valid,
            },
        );
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.lock().expect("mock lock poisoned");
        state.unreachable = unreachable;
    }

    /// Transfers accepted so far, in submission order.
    pub fn submissions(&self) -> Vec<TransferRequest> {
        let state = self.state.lock().expect("mock lock poisoned");
        state
            .submission_log
            .iter()
            .filter_map(|key| state.submitted.get(key).cloned())
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.state
            .lock()
            .expect("mock lock poisoned")
            .submission_log
            .len()
    }

    fn check_reachable(&self, state: &MockState) -> Result<(), ConnectorError> {
        if state.unreachable {
            return Err(ConnectorError::Transport(format!(
                "{} unreachable",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerConnector for MockLedgerConnector {
    fn ledger_name(&self) -> &str {
        &self.name
    }

    async fn get_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, ConnectorError> {
        let state = self.state.lock().expect("mock lock poisoned");
        self.check_reachable(&state)?;
        Ok(state
            .balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, ConnectorError> {
        let mut state = self.state.lock().expect("mock lock poisoned");
        self.check_reachable(&state)?;

        // Idempotent: a resubmission returns the original hash without a
        // second transfer.
        if state.submitted.contains_key(&request.idempotency_key) {
            return Ok(format!("{}-tx-{}", self.name, request.idempotency_key));
        }

        state.next_tx_seq += 1;
        state
            .submitted
            .insert(request.idempotency_key.clone(), request.clone());
        state.submission_log.push(request.idempotency_key.clone());
        Ok(format!("{}-tx-{}", self.name, request.idempotency_key))
    }

    async fn get_transfer_status(&self, tx_id: &str) -> Result<TransferStatus, ConnectorError> {
        let state = self.state.lock().expect("mock lock poisoned");
        self.check_reachable(&state)?;
        state
            .statuses
            .get(tx_id)
            .copied()
            .ok_or_else(|| ConnectorError::NotFound(tx_id.to_string()))
    }

    async fn network_info(&self) -> Result<NetworkInfo, ConnectorError> {
        let state = self.state.lock().expect("mock lock poisoned");
        self.check_reachable(&state)?;
        Ok(NetworkInfo {
            name: self.name.clone(),
            latest_height: state.next_tx_seq,
            base_fee: Some(10),
        })
    }
}
