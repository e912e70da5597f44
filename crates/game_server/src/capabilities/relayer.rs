//! HTTP client for the chain relayer.
//!
//! The relayer owns the signing key for the wager contract. It exposes:
//!
//! * `GET  {base}/balances/{wallet}` returning `{"balance": "<units>"}`
//! * `POST {base}/settlements` taking a settlement request and returning
//!   `{"transaction": "<hash>"}`
//! * `GET  {base}/settlements/{hash}` returning
//!   `{"status": "pending" | "confirmed" | "failed", "message": ...}`

use async_trait::async_trait;
use gambit_rooms::{SettlementRequest, TokenAmount, WalletAddress};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{BalanceOracle, SettlementGateway, TransactionHandle};
use crate::error::ExternalError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    transaction: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: ReceiptStatus,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the relayer API
#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: Client,
    base_url: String,
}

impl RelayerClient {
    pub fn new(base_url: &str, request_timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ExternalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_status(status, error_text))
    }
}

#[async_trait]
impl BalanceOracle for RelayerClient {
    async fn balance_of(&self, wallet: &WalletAddress) -> Result<TokenAmount, ExternalError> {
        let response = self
            .client
            .get(format!("{}/balances/{}", self.base_url, wallet))
            .send()
            .await
            .map_err(classify_transport)?;
        let body: BalanceResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        Ok(body.balance)
    }
}

#[async_trait]
impl SettlementGateway for RelayerClient {
    async fn submit_result(
        &self,
        request: &SettlementRequest,
    ) -> Result<TransactionHandle, ExternalError> {
        let response = self
            .client
            .post(format!("{}/settlements", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;
        let body: SubmitResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        Ok(TransactionHandle(body.transaction))
    }

    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        timeout_ms: u64,
    ) -> Result<(), ExternalError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let response = self
                .client
                .get(format!("{}/settlements/{}", self.base_url, handle.0))
                .send()
                .await
                .map_err(classify_transport)?;
            let receipt: ReceiptResponse = Self::check(response)
                .await?
                .json()
                .await
                .map_err(|e| ExternalError::Unavailable(e.to_string()))?;

            match receipt.status {
                ReceiptStatus::Confirmed => return Ok(()),
                ReceiptStatus::Failed => {
                    return Err(ExternalError::Rejected(
                        receipt
                            .message
                            .unwrap_or_else(|| "transaction reverted".to_string()),
                    ))
                }
                ReceiptStatus::Pending => {
                    debug!(transaction = %handle.0, "⏳ Settlement pending");
                }
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(ExternalError::Timeout("settlement confirmation".to_string()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

fn classify_transport(error: reqwest::Error) -> ExternalError {
    if error.is_timeout() {
        ExternalError::Timeout("relayer request".to_string())
    } else {
        ExternalError::Unavailable(error.to_string())
    }
}

/// Client errors are final; server errors and throttling may clear up.
fn classify_status(status: StatusCode, body: String) -> ExternalError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        ExternalError::Rejected(format!("{status}: {body}"))
    } else {
        ExternalError::Unavailable(format!("{status}: {body}"))
    }
}
