//! Settlement submission with bounded retry.
//!
//! A finished staked game is submitted to the [`SettlementGateway`] and its
//! confirmation awaited. Retryable failures back off exponentially with
//! jitter up to a fixed attempt ceiling. The outcome is returned as a
//! [`SettlementReport`] for the room to record; it never alters the game
//! result.

use gambit_rooms::{SettlementReport, SettlementRequest};
use rand::Rng;
use std::time::Duration;

use crate::capabilities::{with_timeout, SettlementGateway};
use crate::config::ChainConfig;
use crate::error::ExternalError;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays
    pub jitter_factor: f64,
    /// Upper bound on one submission call
    pub request_timeout_ms: u64,
    /// Upper bound on waiting for a receipt
    pub confirmation_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ChainConfig::default())
    }
}

impl From<&ChainConfig> for RetryConfig {
    fn from(chain: &ChainConfig) -> Self {
        Self {
            max_attempts: chain.settlement_attempts.max(1),
            base_delay_ms: chain.retry_base_delay_ms,
            max_delay_ms: chain.retry_max_delay_ms,
            jitter_factor: 0.2,
            request_timeout_ms: chain.request_timeout_ms,
            confirmation_timeout_ms: chain.confirmation_timeout_ms,
        }
    }
}

impl RetryConfig {
    /// Calculate delay before retry `attempt` (1-based) using exponential
    /// backoff with jitter
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.base_delay_ms;
        // Exponential: base * 2^(attempt-1)
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay_ms);

        let jitter_range = (capped as f64 * self.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }
}

/// Submits `request` and waits for confirmation, retrying transient
/// failures.
///
/// # Returns
///
/// `Confirmed` with the transaction id, or `Failed` with the number of
/// attempts made and the last error.
pub async fn settle(
    gateway: &dyn SettlementGateway,
    request: &SettlementRequest,
    config: &RetryConfig,
) -> SettlementReport {
    let mut attempt = 1;
    loop {
        match submit_once(gateway, request, config).await {
            Ok(transaction) => {
                tracing::info!(
                    room_id = %request.room_id,
                    %transaction,
                    attempt,
                    "⛓️ Settlement confirmed"
                );
                return SettlementReport::Confirmed { transaction };
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = config.calculate_delay(attempt);
                tracing::warn!(
                    room_id = %request.room_id,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay,
                    error = %e,
                    "Settlement failed, retrying..."
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    room_id = %request.room_id,
                    attempts = attempt,
                    error = %e,
                    "Settlement failed, result stays recorded locally"
                );
                return SettlementReport::Failed {
                    attempts: attempt,
                    message: e.to_string(),
                };
            }
        }
    }
}

async fn submit_once(
    gateway: &dyn SettlementGateway,
    request: &SettlementRequest,
    config: &RetryConfig,
) -> Result<String, ExternalError> {
    let handle = with_timeout(
        "settlement submission",
        config.request_timeout_ms,
        gateway.submit_result(request),
    )
    .await?;
    with_timeout(
        "settlement confirmation",
        config.confirmation_timeout_ms,
        gateway.await_confirmation(&handle, config.confirmation_timeout_ms),
    )
    .await?;
    Ok(handle.0)
}
