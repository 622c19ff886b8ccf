//! Domain events
//!
//! The relay publishes events onto a bounded channel instead of invoking
//! listeners directly. A logging consumer runs as its own task; a full
//! channel drops the event with a warning rather than blocking the relay.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crosslane_registry::Direction;

/// Default bound for the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    TransferObserved {
        id: String,
        direction: Direction,
        asset: String,
        amount: u128,
    },
    TransferProcessed {
        id: String,
        approved: bool,
        reason: Option<String>,
    },
    ConfigUpdated {
        confirmation_threshold: u32,
        auto_process: bool,
        fee_rate_bps: u32,
    },
}

/// Non-blocking publisher handle.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BridgeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Publish without blocking; drops the event when the channel is full.
    pub fn publish(&self, event: BridgeEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "event channel full, dropping event");
        }
    }
}

/// Consume events and emit structured log lines until the channel closes.
pub async fn run_event_logger(mut rx: mpsc::Receiver<BridgeEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            BridgeEvent::TransferObserved {
                id,
                direction,
                asset,
                amount,
            } => {
                info!(tx_id = %id, direction = %direction, asset = %asset, amount,
                      "transfer observed");
            }
            BridgeEvent::TransferProcessed { id, approved, reason } => {
                info!(tx_id = %id, approved, reason = reason.as_deref().unwrap_or(""),
                      "transfer processed");
            }
            BridgeEvent::ConfigUpdated {
                confirmation_threshold,
                auto_process,
                fee_rate_bps,
            } => {
                info!(
                    confirmation_threshold,
                    auto_process, fee_rate_bps, "validator configuration updated"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (bus, mut rx) = EventBus::new(4);
        bus.publish(BridgeEvent::TransferProcessed {
            id: "tx-1".to_string(),
            approved: true,
            reason: None,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, BridgeEvent::TransferProcessed { .. }));
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (bus, _rx) = EventBus::new(1);
        for i in 0..10 {
            // Must not deadlock even though nothing drains the channel.
            bus.publish(BridgeEvent::TransferProcessed {
                id: format!("tx-{}", i),
                approved: false,
                reason: Some("test".to_string()),
            });
        }
    }
}
