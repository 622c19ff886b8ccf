//! Relay service
//!
//! The orchestrator that ties the registry, the pending queue, and the two
//! ledger connectors together. One tick refreshes source confirmations for
//! every pending transfer and drives confirmed ones to a terminal registry
//! state; the HTTP API calls into the same service for submissions and
//! manual decisions.
//!
//! All mutable state lives behind a single `RwLock`. Processing of one
//! transfer id is claimed inside that lock before the first await, so two
//! concurrent decisions for the same id produce exactly one registry call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crosslane_registry::{
    fees, hash, AccountId, AssetId, BridgeTransaction, Direction, RegistryError, RegistryState,
    ResolvedVerification, TxStatus, Verifier,
};

use crate::audit::{AuditEntry, AuditKind, AuditLog};
use crate::clock::Clock;
use crate::config::{PolicyUpdate, ValidatorConfig, ValidatorPolicy};
use crate::connectors::{ConnectorError, LedgerConnector, TransferRequest};
use crate::error::RelayError;
use crate::events::{BridgeEvent, EventBus};
use crate::metrics;
use crate::queue::{PendingQueue, PendingTransfer};
use crate::retry::{classify_connector_error, CircuitBreakerConfig, ErrorClass, RetryConfig};

/// One side of the bridge: a connector plus the custody (door) account the
/// relay controls on that ledger.
#[derive(Clone)]
pub struct LedgerSide {
    pub connector: Arc<dyn LedgerConnector>,
    pub custody: AccountId,
}

/// Terminal decision for a pending transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

/// Result of a terminal decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Approved {
        tx_id: String,
        net_amount: u128,
        /// Ledger A payout hash for withdrawals; deposits settle on the
        /// registry itself.
        payout_tx: Option<String>,
    },
    Rejected {
        tx_id: String,
        reason: String,
    },
}

/// A transfer handed to the relay for finalization.
#[derive(Debug, Clone)]
pub struct ObservedTransfer {
    pub id: String,
    pub source_tx_id: String,
    pub direction: Direction,
    pub source_address: AccountId,
    pub dest_address: AccountId,
    pub asset: AssetId,
    pub amount: u128,
}

/// Deposit submission (Ledger A into the bridge).
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub from: AccountId,
    pub dest: AccountId,
    pub asset: AssetId,
    pub amount: u128,
}

/// Withdrawal submission (burn on the registry, payout on Ledger A).
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub from: AccountId,
    pub dest: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    /// The user's Ledger B transaction hash. Doubles as the bridge
    /// transaction id, so resubmitting the same hash cannot burn twice.
    pub source_tx_hash: String,
}

/// Receipt returned for an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub tx_id: String,
    pub gross_amount: u128,
    pub fee: u128,
    pub net_amount: u128,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub refreshed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub errors: usize,
}

/// Point-in-time service status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub active: bool,
    pub paused: bool,
    pub pending_transactions: usize,
    pub uptime_ms: i64,
    pub confirmation_threshold: u32,
    pub auto_process: bool,
}

/// Aggregate processing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub total_transactions: u64,
    pub approved_transactions: u64,
    pub rejected_transactions: u64,
    pub average_processing_time_ms: u64,
    pub total_ticks: u64,
    pub pending_transactions: usize,
}

/// Queryable status of one transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusView {
    pub is_valid: bool,
    pub is_processed: bool,
    pub status: String,
}

#[derive(Debug, Default)]
struct RelayStats {
    total_transactions: u64,
    approved_transactions: u64,
    rejected_transactions: u64,
    total_ticks: u64,
    processing_time_ms_sum: u64,
}

struct RelayInner {
    registry: RegistryState,
    queue: PendingQueue,
    policy: ValidatorPolicy,
    audit: AuditLog,
    stats: RelayStats,
    active: bool,
    started_at: Option<DateTime<Utc>>,
    accumulated_uptime_ms: i64,
}

/// The validator relay service. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RwLock<RelayInner>>,
    ledger_a: LedgerSide,
    ledger_b: LedgerSide,
    clock: Arc<dyn Clock>,
    events: EventBus,
    validator_id: AccountId,
    owner: AccountId,
    poll_interval: Duration,
    retry: RetryConfig,
}

impl RelayService {
    pub fn new(
        registry: RegistryState,
        config: &ValidatorConfig,
        ledger_a: LedgerSide,
        ledger_b: LedgerSide,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RelayInner {
                registry,
                queue: PendingQueue::new(),
                policy: config.policy.clone(),
                audit: AuditLog::default(),
                stats: RelayStats::default(),
                active: false,
                started_at: None,
                accumulated_uptime_ms: 0,
            })),
            ledger_a,
            ledger_b,
            clock,
            events,
            validator_id: config.validator_id.clone(),
            owner: config.owner.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            retry: RetryConfig::default(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Activate the tick loop. Fails when already active.
    pub async fn start(&self) -> Result<(), RelayError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        if inner.active {
            return Err(RelayError::AlreadyActive);
        }
        inner.active = true;
        inner.started_at = Some(now);
        inner
            .audit
            .record(now, AuditKind::Control, None, "relay started");
        metrics::UP.set(1.0);
        info!("relay service started");
        Ok(())
    }

    /// Deactivate the tick loop; an in-flight tick finishes on its own.
    pub async fn stop(&self) -> Result<(), RelayError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        if !inner.active {
            return Err(RelayError::NotActive);
        }
        if let Some(started) = inner.started_at.take() {
            inner.accumulated_uptime_ms += (now - started).num_milliseconds();
        }
        inner.active = false;
        inner
            .audit
            .record(now, AuditKind::Control, None, "relay stopped");
        metrics::UP.set(0.0);
        info!("relay service stopped");
        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        self.inner.read().await.active
    }

    /// Tick on `poll_interval` while active, until shutdown is signalled.
    ///
    /// Ticks where every connector call failed trip a circuit breaker after
    /// `CircuitBreakerConfig::threshold` in a row, pausing the loop instead
    /// of hammering unreachable ledgers.
    pub async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let breaker = CircuitBreakerConfig::default();
        let mut failing_ticks = 0u32;
        info!(interval_ms = self.poll_interval.as_millis() as u64, "relay loop running");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("relay loop shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if !self.is_active().await {
                        continue;
                    }
                    let summary = self.tick().await;
                    debug!(?summary, "tick complete");
                    if summary.errors > 0 && summary.refreshed == 0 {
                        failing_ticks += 1;
                    } else {
                        failing_ticks = 0;
                    }
                    if failing_ticks >= breaker.threshold {
                        warn!(
                            ticks = failing_ticks,
                            pause_secs = breaker.pause_duration.as_secs(),
                            "every connector call failing, pausing the loop"
                        );
                        failing_ticks = 0;
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    info!("relay loop shutting down");
                                    return;
                                }
                            }
                            _ = tokio::time::sleep(breaker.pause_duration) => {}
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    /// Submit a deposit: moves the user's funds into the Ledger A custody
    /// account and enqueues the resulting transaction for confirmation
    /// tracking. The payout on this side happens at processing time via
    /// `mint`.
    pub async fn submit_deposit(
        &self,
        request: DepositRequest,
    ) -> Result<SubmissionReceipt, RelayError> {
        let now = self.clock.now();
        let split = {
            let inner = self.inner.read().await;
            if inner.registry.paused {
                return Err(RelayError::from(RegistryError::Paused));
            }
            validate_submission(&inner, &request.asset, request.amount)?;
            fees::split(request.amount, inner.policy.fee_rate_bps)?
        };

        let idempotency_key =
            hash::content_id(&request.from, &request.asset, request.amount, &request.dest, now);
        let transfer = TransferRequest {
            from: request.from.clone(),
            to: self.ledger_a.custody.clone(),
            asset: request.asset.clone(),
            amount: request.amount,
            idempotency_key,
        };
        let tx_hash = self
            .ledger_a
            .connector
            .submit_transfer(&transfer)
            .await
            .map_err(connector_to_relay)?;

        self.enqueue(ObservedTransfer {
            id: tx_hash.clone(),
            source_tx_id: tx_hash.clone(),
            direction: Direction::Deposit,
            source_address: request.from,
            dest_address: request.dest,
            asset: request.asset,
            amount: request.amount,
        })
        .await?;

        Ok(SubmissionReceipt {
            tx_id: tx_hash,
            gross_amount: split.gross,
            fee: split.fee,
            net_amount: split.net,
        })
    }

    /// Submit a withdrawal: burns the caller's registry balance and enqueues
    /// the transaction. The Ledger A payout happens at processing time.
    ///
    /// Idempotent on the source tx hash; a retry of an accepted or already
    /// processed withdrawal fails with `Duplicate` and burns nothing.
    pub async fn submit_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> Result<SubmissionReceipt, RelayError> {
        let now = self.clock.now();
        if request.source_tx_hash.is_empty() {
            return Err(RelayError::Validation(
                "source_tx_hash must not be empty".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        validate_submission(&inner, &request.asset, request.amount)?;

        let id = match inner.registry.burn(
            &request.from,
            &request.asset,
            request.amount,
            &request.dest,
            &request.source_tx_hash,
            now,
        ) {
            Ok(id) => id,
            Err(RegistryError::DuplicateTransaction(id)) => {
                return Err(RelayError::Duplicate(id));
            }
            Err(e) => return Err(e.into()),
        };
        let tx = inner
            .registry
            .transaction(&id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;

        inner.queue.insert(PendingTransfer {
            id: id.clone(),
            source_tx_id: id.clone(),
            direction: Direction::Withdrawal,
            source_address: request.from,
            dest_address: request.dest,
            asset: request.asset.clone(),
            amount: request.amount,
            confirmations: 0,
            observed_at: now,
            verification_failures: 0,
        })?;
        inner.audit.record(
            now,
            AuditKind::Observed,
            Some(&id),
            format!("withdrawal of {} {} accepted", request.amount, request.asset),
        );
        metrics::record_transfer_observed(Direction::Withdrawal.as_str());
        metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
        self.events.publish(BridgeEvent::TransferObserved {
            id: id.clone(),
            direction: Direction::Withdrawal,
            asset: request.asset.to_string(),
            amount: request.amount,
        });

        Ok(SubmissionReceipt {
            tx_id: id,
            gross_amount: tx.gross_amount,
            fee: tx.fee,
            net_amount: tx.net_amount,
        })
    }

    /// Hand an externally observed transfer to the relay. Idempotent on the
    /// transfer id; a second observation of a known or finalized id fails
    /// with `Duplicate`.
    pub async fn enqueue(&self, observed: ObservedTransfer) -> Result<(), RelayError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        validate_submission(&inner, &observed.asset, observed.amount)?;
        if let Some(tx) = inner.registry.transaction(&observed.id) {
            if tx.status.is_terminal() {
                return Err(RelayError::Duplicate(observed.id));
            }
        }

        inner.queue.insert(PendingTransfer {
            id: observed.id.clone(),
            source_tx_id: observed.source_tx_id.clone(),
            direction: observed.direction,
            source_address: observed.source_address,
            dest_address: observed.dest_address,
            asset: observed.asset.clone(),
            amount: observed.amount,
            confirmations: 0,
            observed_at: now,
            verification_failures: 0,
        })?;
        inner.audit.record(
            now,
            AuditKind::Observed,
            Some(&observed.id),
            format!(
                "{} of {} {} observed",
                observed.direction, observed.amount, observed.asset
            ),
        );
        metrics::record_transfer_observed(observed.direction.as_str());
        metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
        self.events.publish(BridgeEvent::TransferObserved {
            id: observed.id,
            direction: observed.direction,
            asset: observed.asset.to_string(),
            amount: observed.amount,
        });
        Ok(())
    }

    /// Lock funds on the registry and track the resulting transaction. The
    /// payout to `dest_on_a` happens at processing time.
    pub async fn lock(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        amount: u128,
        dest_on_a: &AccountId,
    ) -> Result<String, RelayError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        let id = inner.registry.lock(caller, asset, amount, dest_on_a, now)?;
        inner.queue.insert(PendingTransfer {
            id: id.clone(),
            source_tx_id: id.clone(),
            direction: Direction::Withdrawal,
            source_address: caller.clone(),
            dest_address: dest_on_a.clone(),
            asset: asset.clone(),
            amount,
            confirmations: 0,
            observed_at: now,
            verification_failures: 0,
        })?;
        inner.audit.record(
            now,
            AuditKind::Observed,
            Some(&id),
            format!("lock of {} {} accepted", amount, asset),
        );
        metrics::record_transfer_observed(Direction::Withdrawal.as_str());
        metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
        self.events.publish(BridgeEvent::TransferObserved {
            id: id.clone(),
            direction: Direction::Withdrawal,
            asset: asset.to_string(),
            amount,
        });
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One pass over the pending queue: refresh source confirmations and
    /// drive confirmed transfers to a terminal state. Failures on one
    /// transfer never stop the pass.
    pub async fn tick(&self) -> TickSummary {
        let timer = std::time::Instant::now();
        let mut summary = TickSummary::default();

        let (snapshot, policy) = {
            let inner = self.inner.read().await;
            (inner.queue.snapshot(), inner.policy.clone())
        };

        for entry in snapshot {
            let connector = self.source_connector(entry.direction);
            match connector.get_transfer_status(&entry.source_tx_id).await {
                Ok(status) => {
                    metrics::CONSECUTIVE_FAILURES
                        .with_label_values(&[connector.ledger_name()])
                        .set(0.0);
                    summary.refreshed += 1;

                    if !status.valid {
                        if self.note_verification_failure(&entry.id, "source reported invalid").await
                        {
                            summary.rejected += 1;
                        }
                        continue;
                    }

                    let confirmations = {
                        let mut inner = self.inner.write().await;
                        let confirmations = inner
                            .queue
                            .record_confirmations(&entry.id, status.confirmations);
                        // The registry may not have a record yet for
                        // externally observed deposits.
                        let _ = inner
                            .registry
                            .record_confirmations(&entry.id, status.confirmations);
                        confirmations
                    };
                    let Some(confirmations) = confirmations else {
                        continue;
                    };

                    if policy.auto_process && confirmations >= policy.confirmation_threshold {
                        match self.process_transaction(&entry.id, Decision::Approve).await {
                            Ok(ProcessOutcome::Approved { .. }) => summary.approved += 1,
                            Ok(ProcessOutcome::Rejected { .. }) => summary.rejected += 1,
                            // Lost the race to a concurrent decision.
                            Err(RelayError::InProgress(_)) | Err(RelayError::Duplicate(_)) => {}
                            Err(RelayError::Verification(_)) => summary.errors += 1,
                            Err(e) => {
                                warn!(tx_id = %entry.id, error = %e, "auto-process failed");
                                summary.errors += 1;
                            }
                        }
                    }
                }
                Err(ConnectorError::NotFound(_)) => {
                    summary.refreshed += 1;
                    if self
                        .note_verification_failure(&entry.id, "source transaction not found")
                        .await
                    {
                        summary.rejected += 1;
                    }
                }
                Err(e) => {
                    // Connectivity problems never count against the
                    // verification cap.
                    metrics::record_error(connector.ledger_name(), e.kind_label());
                    metrics::CONSECUTIVE_FAILURES
                        .with_label_values(&[connector.ledger_name()])
                        .inc();
                    warn!(tx_id = %entry.id, ledger = connector.ledger_name(), error = %e,
                          "confirmation refresh failed");
                    summary.errors += 1;
                }
            }
        }

        {
            let mut inner = self.inner.write().await;
            inner.stats.total_ticks += 1;
            metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
        }
        metrics::TICK_DURATION.observe(timer.elapsed().as_secs_f64());
        metrics::LAST_SUCCESSFUL_TICK.set(self.clock.now().timestamp() as f64);
        summary
    }

    /// Count one failed source verification; rejects the transfer once the
    /// cap is reached. Returns true when the transfer was rejected.
    async fn note_verification_failure(&self, id: &str, reason: &str) -> bool {
        let exhausted = {
            let mut inner = self.inner.write().await;
            match inner.queue.record_verification_failure(id) {
                Some(failures) => failures >= inner.policy.max_verification_attempts,
                None => return false,
            }
        };
        if !exhausted {
            debug!(tx_id = %id, reason, "source verification failed, will retry");
            return false;
        }
        let reason = format!("verification attempts exhausted: {}", reason);
        matches!(
            self.process_transaction(id, Decision::Reject { reason }).await,
            Ok(ProcessOutcome::Rejected { .. })
        )
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Drive one pending transfer to a terminal state.
    ///
    /// The id is claimed under the state lock before the first await, so of
    /// two concurrent calls exactly one reaches the registry; the other
    /// fails with `InProgress` (or `Duplicate` once the first finished).
    pub async fn process_transaction(
        &self,
        id: &str,
        decision: Decision,
    ) -> Result<ProcessOutcome, RelayError> {
        let now = self.clock.now();
        let entry = {
            let mut inner = self.inner.write().await;
            if let Some(tx) = inner.registry.transaction(id) {
                if tx.status.is_terminal() {
                    return Err(RelayError::Duplicate(id.to_string()));
                }
            }
            let Some(entry) = inner.queue.get(id).cloned() else {
                return Err(RelayError::NotFound(id.to_string()));
            };
            if !inner.queue.claim(id) {
                return Err(RelayError::InProgress(id.to_string()));
            }

            if let Decision::Reject { reason } = &decision {
                let outcome = self.finalize_reject(&mut inner, &entry, reason, now);
                return outcome;
            }
            entry
        };

        // Approval path: resolve the source verification without holding the
        // lock, then apply the registry operation.
        let connector = self.source_connector(entry.direction);
        let resolved = match connector.get_transfer_status(&entry.source_tx_id).await {
            Ok(status) if status.valid => ResolvedVerification::valid(status.confirmations),
            Ok(_) => ResolvedVerification::invalid("source reported invalid"),
            Err(ConnectorError::NotFound(_)) => {
                ResolvedVerification::invalid("source transaction not found")
            }
            Err(e) if e.is_retryable() => ResolvedVerification::unavailable(),
            Err(e) => ResolvedVerification::invalid(e.to_string()),
        };

        let payout = {
            let mut inner = self.inner.write().await;
            if let crosslane_registry::VerificationOutcome::Valid(details) =
                resolved.verify(&entry.source_tx_id)
            {
                if details.confirmations >= inner.policy.confirmation_threshold {
                    // Observable intermediate state for records the registry
                    // already tracks; deposits get their record at mint time.
                    let _ = inner.registry.mark_verified(id);
                }
            }
            let result = match entry.direction {
                Direction::Withdrawal => inner.registry.unlock(
                    &self.validator_id,
                    id,
                    &entry.asset,
                    entry.amount,
                    &entry.dest_address,
                    &resolved,
                    now,
                ),
                Direction::Deposit => inner.registry.mint(
                    &self.validator_id,
                    id,
                    &entry.asset,
                    entry.amount,
                    &entry.dest_address,
                    &resolved,
                    now,
                ),
            };
            match result {
                Ok(payout) => {
                    inner.queue.remove(id);
                    inner.stats.total_transactions += 1;
                    inner.stats.approved_transactions += 1;
                    let elapsed = (now - entry.observed_at).num_milliseconds().max(0) as u64;
                    inner.stats.processing_time_ms_sum += elapsed;
                    inner.audit.record(
                        now,
                        AuditKind::Approved,
                        Some(id),
                        format!(
                            "approved, paying {} {} to {}",
                            payout.net_amount, payout.asset, payout.recipient
                        ),
                    );
                    metrics::record_transfer_processed(entry.direction.as_str(), true);
                    metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
                    self.events.publish(BridgeEvent::TransferProcessed {
                        id: id.to_string(),
                        approved: true,
                        reason: None,
                    });
                    payout
                }
                Err(e) => {
                    return Err(self.finalize_approve_failure(&mut inner, &entry, e, now));
                }
            }
        };

        // Withdrawals settle on Ledger A; the submission is idempotent on the
        // transaction id, so a crash between the registry write and this call
        // is safe to replay.
        let payout_tx = if entry.direction == Direction::Withdrawal {
            let request = TransferRequest {
                from: self.ledger_a.custody.clone(),
                to: payout.recipient.clone(),
                asset: payout.asset.clone(),
                amount: payout.net_amount,
                idempotency_key: id.to_string(),
            };
            self.submit_payout(id, &request, now).await
        } else {
            None
        };

        Ok(ProcessOutcome::Approved {
            tx_id: id.to_string(),
            net_amount: payout.net_amount,
            payout_tx,
        })
    }

    /// Submit the Ledger A payout, retrying transient connector failures with
    /// backoff. Gives up once retries are exhausted; the submission is idempotent
    /// on the transaction id so an operator can replay it later.
    async fn submit_payout(
        &self,
        id: &str,
        request: &TransferRequest,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let mut attempt = 0;
        loop {
            match self.ledger_a.connector.submit_transfer(request).await {
                Ok(tx_hash) => {
                    info!(tx_id = %id, payout_tx = %tx_hash, net = request.amount,
                          "payout submitted");
                    return Some(tx_hash);
                }
                Err(e) => {
                    metrics::record_error(self.ledger_a.connector.ledger_name(), e.kind_label());
                    if classify_connector_error(&e) == ErrorClass::Transient
                        && self.retry.should_retry(attempt)
                    {
                        let backoff = self.retry.backoff_for_attempt(attempt);
                        warn!(tx_id = %id, error = %e, backoff_secs = backoff.as_secs(),
                              "payout submission failed, retrying");
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    error!(tx_id = %id, error = %e,
                           "payout submission failed, resubmit with the same id");
                    let mut inner = self.inner.write().await;
                    inner.audit.record(
                        now,
                        AuditKind::Error,
                        Some(id),
                        format!("payout submission failed: {}", e),
                    );
                    return None;
                }
            }
        }
    }

    fn finalize_reject(
        &self,
        inner: &mut RelayInner,
        entry: &PendingTransfer,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, RelayError> {
        match inner
            .registry
            .reject(&self.validator_id, &entry.id, reason, now)
        {
            Ok(()) => {
                inner.queue.remove(&entry.id);
                inner.stats.total_transactions += 1;
                inner.stats.rejected_transactions += 1;
                inner.audit.record(
                    now,
                    AuditKind::Rejected,
                    Some(&entry.id),
                    format!("rejected: {}", reason),
                );
                metrics::record_transfer_processed(entry.direction.as_str(), false);
                metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
                self.events.publish(BridgeEvent::TransferProcessed {
                    id: entry.id.clone(),
                    approved: false,
                    reason: Some(reason.to_string()),
                });
                Ok(ProcessOutcome::Rejected {
                    tx_id: entry.id.clone(),
                    reason: reason.to_string(),
                })
            }
            Err(e) => {
                inner.queue.release(&entry.id);
                inner.audit.record(
                    now,
                    AuditKind::Error,
                    Some(&entry.id),
                    format!("reject failed: {}", e),
                );
                Err(RelayError::from(e))
            }
        }
    }

    /// Map a failed registry payout to the relay error surface, releasing or
    /// dropping the claim so the transfer can be retried where that makes
    /// sense.
    fn finalize_approve_failure(
        &self,
        inner: &mut RelayInner,
        entry: &PendingTransfer,
        error: RegistryError,
        now: DateTime<Utc>,
    ) -> RelayError {
        match error {
            RegistryError::DuplicateTransaction(id) => {
                // Someone else finished it; nothing left to do here.
                inner.queue.remove(&entry.id);
                metrics::QUEUE_DEPTH.set(inner.queue.len() as f64);
                RelayError::Duplicate(id)
            }
            RegistryError::VerificationUnavailable => {
                inner.queue.release(&entry.id);
                RelayError::Connectivity(format!(
                    "source ledger unreachable for {}",
                    entry.source_tx_id
                ))
            }
            RegistryError::VerificationFailed(reason) => {
                inner.queue.release(&entry.id);
                inner.audit.record(
                    now,
                    AuditKind::Error,
                    Some(&entry.id),
                    format!("verification failed: {}", reason),
                );
                RelayError::Verification(reason)
            }
            e @ RegistryError::InsufficientCustody { .. } => {
                // Fatal accounting problem; keep the transfer pending and
                // make noise.
                inner.queue.release(&entry.id);
                inner.audit.record(
                    now,
                    AuditKind::Error,
                    Some(&entry.id),
                    format!("payout refused: {}", e),
                );
                error!(tx_id = %entry.id, error = %e, "custody shortfall, manual action required");
                metrics::record_error("registry", e.kind());
                RelayError::from(e)
            }
            e => {
                inner.queue.release(&entry.id);
                inner.audit.record(
                    now,
                    AuditKind::Error,
                    Some(&entry.id),
                    format!("payout failed: {}", e),
                );
                RelayError::from(e)
            }
        }
    }

    fn source_connector(&self, direction: Direction) -> Arc<dyn LedgerConnector> {
        match direction {
            Direction::Deposit => Arc::clone(&self.ledger_a.connector),
            Direction::Withdrawal => Arc::clone(&self.ledger_b.connector),
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub async fn policy(&self) -> ValidatorPolicy {
        self.inner.read().await.policy.clone()
    }

    /// Apply a partial policy update. The merged policy is validated before
    /// anything changes, and the registry configuration is kept in step.
    pub async fn update_policy(
        &self,
        update: &PolicyUpdate,
    ) -> Result<ValidatorPolicy, RelayError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        let next = inner
            .policy
            .merged(update)
            .map_err(RelayError::InvalidConfig)?;
        inner.registry.set_config(
            &self.owner,
            next.fee_rate_bps,
            next.min_transfer_amount,
            next.max_transfer_amount,
            next.confirmation_threshold,
        )?;
        inner.policy = next.clone();
        inner.audit.record(
            now,
            AuditKind::ConfigChange,
            None,
            format!(
                "policy updated: threshold={} auto_process={} fee_rate_bps={}",
                next.confirmation_threshold, next.auto_process, next.fee_rate_bps
            ),
        );
        self.events.publish(BridgeEvent::ConfigUpdated {
            confirmation_threshold: next.confirmation_threshold,
            auto_process: next.auto_process,
            fee_rate_bps: next.fee_rate_bps,
        });
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    pub async fn status(&self) -> StatusView {
        let inner = self.inner.read().await;
        let uptime_ms = inner.accumulated_uptime_ms
            + inner
                .started_at
                .map(|s| (self.clock.now() - s).num_milliseconds())
                .unwrap_or(0);
        StatusView {
            active: inner.active,
            paused: inner.registry.paused,
            pending_transactions: inner.queue.len(),
            uptime_ms,
            confirmation_threshold: inner.policy.confirmation_threshold,
            auto_process: inner.policy.auto_process,
        }
    }

    pub async fn stats(&self) -> StatsView {
        let inner = self.inner.read().await;
        let processed = inner.stats.approved_transactions;
        StatsView {
            total_transactions: inner.stats.total_transactions,
            approved_transactions: inner.stats.approved_transactions,
            rejected_transactions: inner.stats.rejected_transactions,
            average_processing_time_ms: if processed == 0 {
                0
            } else {
                inner.stats.processing_time_ms_sum / processed
            },
            total_ticks: inner.stats.total_ticks,
            pending_transactions: inner.queue.len(),
        }
    }

    pub async fn pending(&self) -> Vec<PendingTransfer> {
        self.inner.read().await.queue.snapshot()
    }

    pub async fn logs(&self, limit: usize, offset: usize) -> Vec<AuditEntry> {
        self.inner.read().await.audit.logs(limit, offset)
    }

    pub async fn transaction(&self, id: &str) -> Option<BridgeTransaction> {
        self.inner.read().await.registry.transaction(id).cloned()
    }

    /// Lightweight validity/processing view of one transaction. Falls back to
    /// the pending queue for transfers the registry has not recorded yet.
    pub async fn transaction_status(&self, id: &str) -> Option<TransactionStatusView> {
        let inner = self.inner.read().await;
        if let Some(tx) = inner.registry.transaction(id) {
            return Some(TransactionStatusView {
                is_valid: tx.status != TxStatus::Rejected,
                is_processed: tx.status == TxStatus::Processed,
                status: tx.status.as_str().to_string(),
            });
        }
        inner.queue.get(id).map(|_| TransactionStatusView {
            is_valid: true,
            is_processed: false,
            status: TxStatus::Pending.as_str().to_string(),
        })
    }

    /// Registry balances held by one account, per asset.
    pub async fn account_balances(&self, account: &AccountId) -> BTreeMap<AssetId, u128> {
        let inner = self.inner.read().await;
        inner
            .registry
            .balances
            .iter()
            .filter(|((owner, _), _)| owner == account)
            .map(|((_, asset), amount)| (asset.clone(), *amount))
            .collect()
    }

    /// Point-in-time copy of the registry, for inspection.
    pub async fn registry_snapshot(&self) -> RegistryState {
        self.inner.read().await.registry.clone()
    }

    /// Seed a registry balance. Genesis and test setup only.
    pub async fn seed_balance(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        let mut inner = self.inner.write().await;
        inner.registry.credit(account, asset, amount);
    }
}

fn validate_submission(
    inner: &RelayInner,
    asset: &AssetId,
    amount: u128,
) -> Result<(), RelayError> {
    if !inner.registry.is_asset_supported(asset) {
        return Err(RelayError::Validation(format!(
            "asset {} is not supported",
            asset
        )));
    }
    if amount < inner.policy.min_transfer_amount || amount > inner.policy.max_transfer_amount {
        return Err(RelayError::Validation(format!(
            "amount {} outside bounds [{}, {}]",
            amount, inner.policy.min_transfer_amount, inner.policy.max_transfer_amount
        )));
    }
    Ok(())
}

fn connector_to_relay(error: ConnectorError) -> RelayError {
    match error {
        ConnectorError::Rejected(reason) => RelayError::Validation(reason),
        ConnectorError::NotFound(id) => RelayError::NotFound(id),
        e => RelayError::Connectivity(e.to_string()),
    }
}
