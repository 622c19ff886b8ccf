use std::net::SocketAddr;
use std::sync::Arc;

use crosslane_registry::{AccountId, AssetId, RegistryConfig, RegistryState};
use crosslane_validator::clock::SystemClock;
use crosslane_validator::config::Config;
use crosslane_validator::connectors::HttpLedgerConnector;
use crosslane_validator::events::{self, EventBus, EVENT_CHANNEL_CAPACITY};
use crosslane_validator::relay::{LedgerSide, RelayService};
use crosslane_validator::{api, metrics};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting Crosslane Validator");

    let config = Config::load()?;
    tracing::info!(
        ledger_a = %config.ledger_a.endpoint,
        ledger_b = %config.ledger_b.endpoint,
        validator_id = %config.validator.validator_id,
        "Configuration loaded"
    );

    let ledger_a = LedgerSide {
        connector: Arc::new(HttpLedgerConnector::new("ledger-a", &config.ledger_a)?),
        custody: AccountId::new(config.ledger_a.custody_account.clone()),
    };
    let ledger_b = LedgerSide {
        connector: Arc::new(HttpLedgerConnector::new("ledger-b", &config.ledger_b)?),
        custody: AccountId::new(config.ledger_b.custody_account.clone()),
    };

    let registry = build_registry(&config)?;
    tracing::info!(
        assets = ?config.validator.supported_assets,
        threshold = config.validator.policy.confirmation_threshold,
        "Registry initialized"
    );

    let (events, event_rx) = EventBus::new(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(events::run_event_logger(event_rx));

    let relay = RelayService::new(
        registry,
        &config.validator,
        ledger_a,
        ledger_b,
        Arc::new(SystemClock),
        events,
    );

    if config.validator.auto_start {
        relay.start().await?;
    } else {
        metrics::UP.set(0.0);
        tracing::info!("auto-start disabled, waiting for control request");
    }

    // Shutdown plumbing: the signal task flips the watch channel, the relay
    // loop drains on its next iteration.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let api_addr: SocketAddr = format!("{}:{}", config.api.bind_address, config.api.port)
        .parse()
        .map_err(|e| eyre::eyre!("invalid API bind address: {}", e))?;
    let api_relay = relay.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_relay, api_addr).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    relay.run_loop(shutdown_rx).await;

    if relay.is_active().await {
        let _ = relay.stop().await;
    }
    tracing::info!("Crosslane Validator stopped");
    Ok(())
}

/// Seed the registry from startup configuration: owner, allowlisted assets,
/// and this validator's authorization.
fn build_registry(config: &Config) -> eyre::Result<RegistryState> {
    let owner = config.validator.owner.clone();
    let policy = &config.validator.policy;
    let mut registry = RegistryState::new(RegistryConfig {
        owner: owner.clone(),
        custody: AccountId::new(config.ledger_b.custody_account.clone()),
        fee_collector: config.validator.fee_collector.clone(),
        fee_rate_bps: policy.fee_rate_bps,
        max_fee_rate_bps: policy.max_fee_rate_bps,
        min_transfer_amount: policy.min_transfer_amount,
        max_transfer_amount: policy.max_transfer_amount,
        confirmation_threshold: policy.confirmation_threshold,
    })?;
    for asset in &config.validator.supported_assets {
        registry.add_supported_asset(&owner, AssetId::new(asset.clone()))?;
    }
    registry.authorize_validator(&owner, config.validator.validator_id.clone())?;
    Ok(registry)
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crosslane_validator=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
