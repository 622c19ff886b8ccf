//! End-to-end relay behavior against scripted ledger connectors: the full
//! deposit and withdrawal flows, threshold enforcement, manual decisions,
//! concurrent processing, and the verification failure cap.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crosslane_registry::{AccountId, AssetId, Direction, RegistryConfig, RegistryState, TxStatus};
use crosslane_validator::clock::ManualClock;
use crosslane_validator::config::{PolicyUpdate, ValidatorConfig, ValidatorPolicy};
use crosslane_validator::connectors::MockLedgerConnector;
use crosslane_validator::events::EventBus;
use crosslane_validator::relay::{
    Decision, DepositRequest, LedgerSide, ObservedTransfer, ProcessOutcome, RelayService,
    WithdrawalRequest,
};
use crosslane_validator::RelayError;

struct Harness {
    relay: RelayService,
    ledger_a: Arc<MockLedgerConnector>,
    ledger_b: Arc<MockLedgerConnector>,
    clock: Arc<ManualClock>,
    _event_rx: tokio::sync::mpsc::Receiver<crosslane_validator::events::BridgeEvent>,
}

fn policy() -> ValidatorPolicy {
    ValidatorPolicy {
        confirmation_threshold: 3,
        auto_process: true,
        fee_rate_bps: 10,
        max_fee_rate_bps: 1_000,
        min_transfer_amount: 10,
        max_transfer_amount: 1_000_000,
        max_verification_attempts: 3,
    }
}

fn harness() -> Harness {
    harness_with_policy(policy())
}

fn harness_with_policy(policy: ValidatorPolicy) -> Harness {
    let owner = AccountId::new("owner");
    let mut registry = RegistryState::new(RegistryConfig {
        owner: owner.clone(),
        custody: AccountId::new("custody"),
        fee_collector: AccountId::new("collector"),
        fee_rate_bps: policy.fee_rate_bps,
        max_fee_rate_bps: policy.max_fee_rate_bps,
        min_transfer_amount: policy.min_transfer_amount,
        max_transfer_amount: policy.max_transfer_amount,
        confirmation_threshold: policy.confirmation_threshold,
    })
    .expect("valid config");
    registry
        .add_supported_asset(&owner, AssetId::new("XLN"))
        .unwrap();
    registry
        .authorize_validator(&owner, AccountId::new("validator-1"))
        .unwrap();

    let config = ValidatorConfig {
        validator_id: AccountId::new("validator-1"),
        owner,
        fee_collector: AccountId::new("collector"),
        supported_assets: vec!["XLN".to_string()],
        poll_interval_ms: 50,
        auto_start: false,
        policy,
    };

    let ledger_a = Arc::new(MockLedgerConnector::new("ledger-a"));
    let ledger_b = Arc::new(MockLedgerConnector::new("ledger-b"));
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
    ));
    let (events, event_rx) = EventBus::new(64);

    let relay = RelayService::new(
        registry,
        &config,
        LedgerSide {
            connector: ledger_a.clone(),
            custody: AccountId::new("door-a"),
        },
        LedgerSide {
            connector: ledger_b.clone(),
            custody: AccountId::new("custody"),
        },
        clock.clone(),
        events,
    );

    Harness {
        relay,
        ledger_a,
        ledger_b,
        clock,
        _event_rx: event_rx,
    }
}

fn observed_deposit(id: &str, amount: u128) -> ObservedTransfer {
    ObservedTransfer {
        id: id.to_string(),
        source_tx_id: id.to_string(),
        direction: Direction::Deposit,
        source_address: AccountId::new("rSender"),
        dest_address: AccountId::new("bob"),
        asset: AssetId::new("XLN"),
        amount,
    }
}

#[tokio::test]
async fn withdrawal_locks_then_pays_out_at_threshold() {
    let h = harness();
    let alice = AccountId::new("alice");
    let asset = AssetId::new("XLN");
    h.relay.seed_balance(&alice, &asset, 1_000).await;

    let id = h
        .relay
        .lock(&alice, &asset, 1_000, &AccountId::new("rAlice"))
        .await
        .unwrap();

    // Below threshold: the tick refreshes confirmations but pays nothing.
    h.ledger_b.set_status(&id, 2, true);
    let summary = h.relay.tick().await;
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.approved, 0);
    assert_eq!(h.ledger_a.submission_count(), 0);
    assert_eq!(h.relay.pending().await.len(), 1);

    // At threshold: unlock fires and the Ledger A payout carries the net.
    h.ledger_b.set_status(&id, 3, true);
    let summary = h.relay.tick().await;
    assert_eq!(summary.approved, 1);

    let submissions = h.ledger_a.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].from, AccountId::new("door-a"));
    assert_eq!(submissions[0].to, AccountId::new("rAlice"));
    assert_eq!(submissions[0].amount, 999);
    assert_eq!(submissions[0].idempotency_key, id);

    let registry = h.relay.registry_snapshot().await;
    let tx = registry.transaction(&id).unwrap();
    assert_eq!(tx.status, TxStatus::Processed);
    assert_eq!(tx.net_amount + tx.fee, tx.gross_amount);
    assert_eq!(registry.custody_balance(&asset), 0);
    assert!(h.relay.pending().await.is_empty());
}

#[tokio::test]
async fn deposit_flow_mints_net_to_destination() {
    let h = harness();
    let asset = AssetId::new("XLN");

    let receipt = h
        .relay
        .submit_deposit(DepositRequest {
            from: AccountId::new("rSender"),
            dest: AccountId::new("bob"),
            asset: asset.clone(),
            amount: 1_000,
        })
        .await
        .unwrap();
    assert_eq!(receipt.fee, 1);
    assert_eq!(receipt.net_amount, 999);

    // The user's funds moved into the Ledger A door account.
    let submissions = h.ledger_a.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].to, AccountId::new("door-a"));
    assert_eq!(submissions[0].amount, 1_000);

    h.ledger_a.set_status(&receipt.tx_id, 4, true);
    let summary = h.relay.tick().await;
    assert_eq!(summary.approved, 1);

    let balances = h.relay.account_balances(&AccountId::new("bob")).await;
    assert_eq!(balances.get(&asset), Some(&999));
    let status = h.relay.transaction_status(&receipt.tx_id).await.unwrap();
    assert!(status.is_processed);

    // Deposits settle on the registry; no second Ledger A submission.
    assert_eq!(h.ledger_a.submission_count(), 1);
}

#[tokio::test]
async fn withdrawal_burn_pays_from_door_without_custody() {
    let h = harness();
    let alice = AccountId::new("alice");
    let asset = AssetId::new("XLN");
    h.relay.seed_balance(&alice, &asset, 2_000).await;

    let receipt = h
        .relay
        .submit_withdrawal(WithdrawalRequest {
            from: alice.clone(),
            dest: AccountId::new("rAlice"),
            asset: asset.clone(),
            amount: 2_000,
            source_tx_hash: "b-tx-alice-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(receipt.tx_id, "b-tx-alice-1");
    assert_eq!(receipt.net_amount, 1_998);

    h.ledger_b.set_status(&receipt.tx_id, 5, true);
    let summary = h.relay.tick().await;
    assert_eq!(summary.approved, 1);

    // The burn destroyed the funds on the registry side; only the Ledger A
    // payout moves money.
    let registry = h.relay.registry_snapshot().await;
    assert_eq!(registry.custody_balance(&asset), 0);
    assert_eq!(registry.balance(&alice, &asset), 0);
    let submissions = h.ledger_a.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].amount, 1_998);
}

#[tokio::test]
async fn withdrawal_retry_burns_and_pays_only_once() {
    let h = harness();
    let alice = AccountId::new("alice");
    let asset = AssetId::new("XLN");
    h.relay.seed_balance(&alice, &asset, 2_000).await;

    let request = WithdrawalRequest {
        from: alice.clone(),
        dest: AccountId::new("rAlice"),
        asset: asset.clone(),
        amount: 1_000,
        source_tx_hash: "b-tx-retry".to_string(),
    };
    h.relay.submit_withdrawal(request.clone()).await.unwrap();

    // A client retry a moment later is refused, not accepted as a second burn.
    h.clock.advance(chrono::Duration::milliseconds(1));
    let err = h.relay.submit_withdrawal(request.clone()).await.unwrap_err();
    assert_eq!(err, RelayError::Duplicate("b-tx-retry".to_string()));
    assert_eq!(
        h.relay.account_balances(&alice).await.get(&asset),
        Some(&1_000)
    );
    assert_eq!(h.relay.pending().await.len(), 1);

    // Same refusal once the withdrawal is fully processed.
    h.ledger_b.set_status("b-tx-retry", 3, true);
    assert_eq!(h.relay.tick().await.approved, 1);
    let err = h.relay.submit_withdrawal(request).await.unwrap_err();
    assert_eq!(err, RelayError::Duplicate("b-tx-retry".to_string()));
    assert_eq!(h.ledger_a.submission_count(), 1);

    let registry = h.relay.registry_snapshot().await;
    assert_eq!(registry.stats.total_burns, 1);
    assert_eq!(registry.balance(&alice, &asset), 1_000);
}

#[tokio::test]
async fn manual_reject_is_terminal_and_balance_neutral() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-1", 1_000))
        .await
        .unwrap();

    let outcome = h
        .relay
        .process_transaction(
            "dep-1",
            Decision::Reject {
                reason: "suspicious source".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Rejected {
            tx_id: "dep-1".to_string(),
            reason: "suspicious source".to_string(),
        }
    );

    let registry = h.relay.registry_snapshot().await;
    let tx = registry.transaction("dep-1").unwrap();
    assert_eq!(tx.status, TxStatus::Rejected);
    assert_eq!(tx.reject_reason.as_deref(), Some("suspicious source"));
    assert!(registry.balances.is_empty());
    assert!(h.relay.pending().await.is_empty());

    let logs = h.relay.logs(10, 0).await;
    assert!(logs
        .iter()
        .any(|entry| entry.message.contains("suspicious source")));

    // The decision is final; a late approval cannot resurrect the id.
    let err = h
        .relay
        .process_transaction("dep-1", Decision::Approve)
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::Duplicate("dep-1".to_string()));
}

#[tokio::test]
async fn concurrent_decisions_pay_exactly_once() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-race", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_status("dep-race", 5, true);

    let first = h.relay.process_transaction("dep-race", Decision::Approve);
    let second = h.relay.process_transaction("dep-race", Decision::Approve);
    let (r1, r2) = tokio::join!(first, second);

    let (ok, err) = match (r1, r2) {
        (Ok(o), Err(e)) => (o, e),
        (Err(e), Ok(o)) => (o, e),
        other => panic!("expected exactly one success, got {:?}", other),
    };
    assert!(matches!(ok, ProcessOutcome::Approved { .. }));
    assert!(matches!(
        err,
        RelayError::InProgress(_) | RelayError::Duplicate(_)
    ));

    let registry = h.relay.registry_snapshot().await;
    assert_eq!(registry.stats.total_mints, 1);
    assert_eq!(
        registry.balance(&AccountId::new("bob"), &AssetId::new("XLN")),
        999
    );
}

#[tokio::test]
async fn manual_approve_below_threshold_fails_and_stays_pending() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-low", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_status("dep-low", 2, true);

    let summary = h.relay.tick().await;
    assert_eq!(summary.approved, 0);

    let err = h
        .relay
        .process_transaction("dep-low", Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Verification(_)));

    // Still pending and claimable once confirmations arrive.
    assert_eq!(h.relay.pending().await.len(), 1);
    h.ledger_a.set_status("dep-low", 3, true);
    let outcome = h
        .relay
        .process_transaction("dep-low", Decision::Approve)
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Approved { .. }));
}

#[tokio::test]
async fn invalid_source_is_rejected_after_attempt_cap() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-bad", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_status("dep-bad", 10, false);

    // Two strikes, still pending.
    h.relay.tick().await;
    h.relay.tick().await;
    assert_eq!(h.relay.pending().await.len(), 1);

    // Third strike hits max_verification_attempts.
    let summary = h.relay.tick().await;
    assert_eq!(summary.rejected, 1);

    let registry = h.relay.registry_snapshot().await;
    let tx = registry.transaction("dep-bad").unwrap();
    assert_eq!(tx.status, TxStatus::Rejected);
    assert!(tx
        .reject_reason
        .as_deref()
        .unwrap()
        .contains("verification attempts exhausted"));
    assert!(h.relay.pending().await.is_empty());
}

#[tokio::test]
async fn unreachable_ledger_never_counts_against_the_cap() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-conn", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_unreachable(true);

    // Far more ticks than the attempt cap.
    for _ in 0..10 {
        let summary = h.relay.tick().await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.rejected, 0);
    }
    assert_eq!(h.relay.pending().await.len(), 1);

    // Back online the transfer completes normally.
    h.ledger_a.set_unreachable(false);
    h.ledger_a.set_status("dep-conn", 3, true);
    let summary = h.relay.tick().await;
    assert_eq!(summary.approved, 1);
}

#[tokio::test]
async fn enqueue_is_idempotent_on_transfer_id() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-dup", 1_000))
        .await
        .unwrap();
    let err = h
        .relay
        .enqueue(observed_deposit("dep-dup", 1_000))
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::Duplicate("dep-dup".to_string()));
    assert_eq!(h.relay.pending().await.len(), 1);
}

#[tokio::test]
async fn enqueue_validates_asset_and_bounds() {
    let h = harness();

    let mut unsupported = observed_deposit("dep-asset", 1_000);
    unsupported.asset = AssetId::new("DOGE");
    let err = h.relay.enqueue(unsupported).await.unwrap_err();
    assert!(matches!(err, RelayError::Validation(_)));

    let err = h
        .relay
        .enqueue(observed_deposit("dep-small", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Validation(_)));
    assert!(h.relay.pending().await.is_empty());
}

#[tokio::test]
async fn start_stop_tracks_uptime() {
    let h = harness();
    assert!(!h.relay.is_active().await);
    assert_eq!(
        h.relay.stop().await.unwrap_err(),
        RelayError::NotActive
    );

    h.relay.start().await.unwrap();
    assert_eq!(
        h.relay.start().await.unwrap_err(),
        RelayError::AlreadyActive
    );

    h.clock.advance(chrono::Duration::seconds(90));
    assert_eq!(h.relay.status().await.uptime_ms, 90_000);

    h.relay.stop().await.unwrap();
    assert!(!h.relay.is_active().await);
    assert_eq!(h.relay.status().await.uptime_ms, 90_000);
}

#[tokio::test]
async fn auto_process_off_holds_confirmed_transfers() {
    let mut p = policy();
    p.auto_process = false;
    let h = harness_with_policy(p);

    h.relay
        .enqueue(observed_deposit("dep-hold", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_status("dep-hold", 10, true);

    h.relay.tick().await;
    h.relay.tick().await;
    assert_eq!(h.relay.pending().await.len(), 1);

    // A manual approval still works.
    let outcome = h
        .relay
        .process_transaction("dep-hold", Decision::Approve)
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Approved { .. }));
}

#[tokio::test]
async fn policy_update_validates_and_reaches_the_registry() {
    let h = harness();

    let err = h
        .relay
        .update_policy(&PolicyUpdate {
            fee_rate_bps: Some(5_000),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::InvalidConfig(_)));

    let next = h
        .relay
        .update_policy(&PolicyUpdate {
            confirmation_threshold: Some(5),
            fee_rate_bps: Some(50),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(next.confirmation_threshold, 5);
    assert_eq!(h.relay.policy().await.fee_rate_bps, 50);

    let registry = h.relay.registry_snapshot().await;
    assert_eq!(registry.config.confirmation_threshold, 5);
    assert_eq!(registry.config.fee_rate_bps, 50);
}

#[tokio::test]
async fn stats_track_decisions_and_processing_time() {
    let h = harness();
    h.relay
        .enqueue(observed_deposit("dep-s1", 1_000))
        .await
        .unwrap();
    h.relay
        .enqueue(observed_deposit("dep-s2", 1_000))
        .await
        .unwrap();
    h.ledger_a.set_status("dep-s1", 5, true);

    h.clock.advance(chrono::Duration::seconds(2));
    h.relay
        .process_transaction("dep-s1", Decision::Approve)
        .await
        .unwrap();
    h.relay
        .process_transaction(
            "dep-s2",
            Decision::Reject {
                reason: "no".to_string(),
            },
        )
        .await
        .unwrap();

    let stats = h.relay.stats().await;
    assert_eq!(stats.total_transactions, 2);
    assert_eq!(stats.approved_transactions, 1);
    assert_eq!(stats.rejected_transactions, 1);
    assert_eq!(stats.average_processing_time_ms, 2_000);
    assert_eq!(stats.pending_transactions, 0);
}
