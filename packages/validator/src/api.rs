//! HTTP API for the validator relay service
//!
//! Bridge endpoints for users (deposit, withdraw, balance and transaction
//! lookups) plus the validator control plane (status, stats, config, manual
//! decisions) and the usual health and metrics probes.

use std::net::SocketAddr;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use eyre::{Result, WrapErr};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crosslane_registry::{AccountId, AssetId, RegistryError};

use crate::audit::AuditEntry;
use crate::config::PolicyUpdate;
use crate::error::RelayError;
use crate::queue::PendingTransfer;
use crate::relay::{
    Decision, DepositRequest, ProcessOutcome, RelayService, SubmissionReceipt, WithdrawalRequest,
};

/// Build the router over a shared relay service.
pub fn router(relay: RelayService) -> Router {
    Router::new()
        .route("/bridge/deposit", post(submit_deposit))
        .route("/bridge/withdraw", post(submit_withdrawal))
        .route("/bridge/balance/{address}", get(get_balance))
        .route("/bridge/transaction/{tx_hash}", get(get_transaction))
        .route("/bridge/status/{tx_hash}", get(get_transaction_status))
        .route("/validator/status", get(get_status))
        .route("/validator/stats", get(get_stats))
        .route("/validator/config", get(get_config))
        .route("/validator/config", put(update_config))
        .route("/validator/control", post(control))
        .route("/validator/pending", get(get_pending))
        .route("/validator/logs", get(get_logs))
        .route(
            "/validator/transactions/{id}/process",
            post(process_transaction),
        )
        .route("/health", get(health))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(relay)
}

/// Bind and serve until the task is aborted.
pub async fn serve(relay: RelayService, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind API server to {}", addr))?;
    info!(%addr, "API server listening");
    axum::serve(listener, router(relay))
        .await
        .wrap_err("API server terminated")
}

/// Error envelope returned for every failed request.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelayError::Validation(_) | RelayError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            RelayError::Authorization(_) => StatusCode::FORBIDDEN,
            RelayError::Duplicate(_) | RelayError::InProgress(_) => StatusCode::CONFLICT,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Verification(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RelayError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::AlreadyActive | RelayError::NotActive => StatusCode::CONFLICT,
            RelayError::Registry(e) => match e {
                RegistryError::UnauthorizedOwner(_) | RegistryError::UnauthorizedValidator(_) => {
                    StatusCode::FORBIDDEN
                }
                RegistryError::DuplicateTransaction(_) => StatusCode::CONFLICT,
                RegistryError::UnknownTransaction(_) => StatusCode::NOT_FOUND,
                RegistryError::Paused | RegistryError::VerificationUnavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RegistryError::VerificationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RegistryError::InsufficientCustody { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ----------------------------------------------------------------------
// Bridge endpoints
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TransferBody {
    from: String,
    destination: String,
    asset: String,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct WithdrawBody {
    from: String,
    destination: String,
    asset: String,
    amount: u128,
    /// The user's Ledger B transaction hash; retrying with the same hash is
    /// refused instead of burning twice.
    source_tx_hash: String,
}

async fn submit_deposit(
    State(relay): State<RelayService>,
    Json(body): Json<TransferBody>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let receipt = relay
        .submit_deposit(DepositRequest {
            from: AccountId::new(body.from),
            dest: AccountId::new(body.destination),
            asset: AssetId::new(body.asset),
            amount: body.amount,
        })
        .await?;
    Ok(Json(receipt))
}

async fn submit_withdrawal(
    State(relay): State<RelayService>,
    Json(body): Json<WithdrawBody>,
) -> Result<Json<SubmissionReceipt>, ApiError> {
    let receipt = relay
        .submit_withdrawal(WithdrawalRequest {
            from: AccountId::new(body.from),
            dest: AccountId::new(body.destination),
            asset: AssetId::new(body.asset),
            amount: body.amount,
            source_tx_hash: body.source_tx_hash,
        })
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    address: String,
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Serialize)]
struct AssetBalance {
    asset: String,
    amount: u128,
}

async fn get_balance(
    State(relay): State<RelayService>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let account = AccountId::new(address.clone());
    let balances = relay
        .account_balances(&account)
        .await
        .into_iter()
        .map(|(asset, amount)| AssetBalance {
            asset: asset.to_string(),
            amount,
        })
        .collect();
    Json(BalanceResponse { address, balances })
}

async fn get_transaction(
    State(relay): State<RelayService>,
    Path(tx_hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match relay.transaction(&tx_hash).await {
        Some(tx) => Ok(Json(tx)),
        None => Err(ApiError(RelayError::NotFound(tx_hash))),
    }
}

async fn get_transaction_status(
    State(relay): State<RelayService>,
    Path(tx_hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match relay.transaction_status(&tx_hash).await {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError(RelayError::NotFound(tx_hash))),
    }
}

// ----------------------------------------------------------------------
// Validator control plane
// ----------------------------------------------------------------------

async fn get_status(State(relay): State<RelayService>) -> impl IntoResponse {
    Json(relay.status().await)
}

async fn get_stats(State(relay): State<RelayService>) -> impl IntoResponse {
    Json(relay.stats().await)
}

async fn get_config(State(relay): State<RelayService>) -> impl IntoResponse {
    Json(relay.policy().await)
}

async fn update_config(
    State(relay): State<RelayService>,
    Json(update): Json<PolicyUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let next = relay.update_policy(&update).await?;
    Ok(Json(next))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ControlAction {
    Start,
    Stop,
}

#[derive(Debug, Deserialize)]
struct ControlBody {
    action: ControlAction,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    active: bool,
}

async fn control(
    State(relay): State<RelayService>,
    Json(body): Json<ControlBody>,
) -> Result<Json<ControlResponse>, ApiError> {
    match body.action {
        ControlAction::Start => relay.start().await?,
        ControlAction::Stop => relay.stop().await?,
    }
    Ok(Json(ControlResponse {
        active: relay.is_active().await,
    }))
}

async fn get_pending(State(relay): State<RelayService>) -> Json<Vec<PendingTransfer>> {
    Json(relay.pending().await)
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_logs_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_logs_limit() -> usize {
    100
}

async fn get_logs(
    State(relay): State<RelayService>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<AuditEntry>> {
    Json(relay.logs(query.limit, query.offset).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProcessAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
struct ProcessBody {
    action: ProcessAction,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    tx_id: String,
    approved: bool,
    net_amount: Option<u128>,
    payout_tx: Option<String>,
    reason: Option<String>,
}

async fn process_transaction(
    State(relay): State<RelayService>,
    Path(id): Path<String>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let decision = match body.action {
        ProcessAction::Approve => Decision::Approve,
        ProcessAction::Reject => Decision::Reject {
            reason: body
                .reason
                .unwrap_or_else(|| "manual operator reject".to_string()),
        },
    };
    let outcome = relay.process_transaction(&id, decision).await?;
    Ok(Json(match outcome {
        ProcessOutcome::Approved {
            tx_id,
            net_amount,
            payout_tx,
        } => ProcessResponse {
            tx_id,
            approved: true,
            net_amount: Some(net_amount),
            payout_tx,
            reason: None,
        },
        ProcessOutcome::Rejected { tx_id, reason } => ProcessResponse {
            tx_id,
            approved: false,
            net_amount: None,
            payout_tx: None,
            reason: Some(reason),
        },
    }))
}

// ----------------------------------------------------------------------
// Health and metrics
// ----------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    active: bool,
    pending_transactions: usize,
}

async fn health(State(relay): State<RelayService>) -> Json<HealthResponse> {
    let status = relay.status().await;
    Json(HealthResponse {
        status: "healthy",
        active: status.active,
        pending_transactions: status.pending_transactions,
    })
}

/// Liveness probe (always OK while the server runs).
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe: ready once the relay loop is active.
async fn readiness(State(relay): State<RelayService>) -> Response {
    if relay.is_active().await {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type())], buffer).into_response()
}
