//! JSON-over-HTTP ledger connector
//!
//! Speaks a small REST surface that both ledger gateways expose:
//!
//! - `GET  {base}/accounts/{account}/balances/{asset}` → `{"amount": "123"}`
//! - `POST {base}/transfers` → `{"tx_hash": "..."}`
//! - `GET  {base}/transfers/{tx_id}` → `{"confirmations": 3, "valid": true}`
//! - `GET  {base}/network` → `{"name": "...", "latest_height": 1, "base_fee": "10"}`
//!
//! Every request carries the configured timeout; timeouts and transport
//! failures map to retryable errors.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crosslane_registry::{AccountId, AssetId};

use super::{ConnectorError, LedgerConnector, NetworkInfo, TransferRequest, TransferStatus};
use crate::config::LedgerConfig;

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    confirmations: u32,
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct NetworkResponse {
    name: String,
    latest_height: u64,
    base_fee: Option<String>,
}

pub struct HttpLedgerConnector {
    name: String,
    base_url: String,
    client: Client,
}

impl HttpLedgerConnector {
    pub fn new(name: impl Into<String>, config: &LedgerConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::Timeout(self.name.clone())
        } else {
            ConnectorError::Transport(err.to_string())
        }
    }

    fn parse_amount(&self, raw: &str) -> Result<u128, ConnectorError> {
        raw.parse()
            .map_err(|_| ConnectorError::InvalidResponse(format!("bad amount {:?}", raw)))
    }
}

#[async_trait]
impl LedgerConnector for HttpLedgerConnector {
    fn ledger_name(&self) -> &str {
        &self.name
    }

    async fn get_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, ConnectorError> {
        let url = format!(
            "{}/accounts/{}/balances/{}",
            self.base_url, account, asset
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(ConnectorError::Rejected(format!(
                "balance lookup returned {}",
                response.status()
            )));
        }

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;
        self.parse_amount(&body.amount)
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, ConnectorError> {
        let url = format!("{}/transfers", self.base_url);
        let body = serde_json::json!({
            "from": request.from,
            "to": request.to,
            "asset": request.asset,
            "amount": request.amount.to_string(),
            "idempotency_key": request.idempotency_key,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Rejected(format!(
                "submit returned {}: {}",
                status, detail
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;
        Ok(body.tx_hash)
    }

    async fn get_transfer_status(&self, tx_id: &str) -> Result<TransferStatus, ConnectorError> {
        let url = format!("{}/transfers/{}", self.base_url, tx_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(tx_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ConnectorError::Rejected(format!(
                "status lookup returned {}",
                response.status()
            )));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;
        Ok(TransferStatus {
            confirmations: body.confirmations,
            valid: body.valid,
        })
    }

    async fn network_info(&self) -> Result<NetworkInfo, ConnectorError> {
        let url = format!("{}/network", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(ConnectorError::Rejected(format!(
                "network info returned {}",
                response.status()
            )));
        }

        let body: NetworkResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;
        let base_fee = match body.base_fee {
            Some(raw) => Some(self.parse_amount(&raw)?),
            None => None,
        };
        Ok(NetworkInfo {
            name: body.name,
            latest_height: body.latest_height,
            base_fee,
        })
    }
}
