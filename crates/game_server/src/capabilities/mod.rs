//! External collaborators the dispatcher depends on.
//!
//! Each capability is a trait so the server can run against a real relayer
//! in production and an in-memory ledger in development and tests. Every
//! call is fallible and is wrapped in [`with_timeout`] by the caller.

pub mod auth;
pub mod ledger;
pub mod relayer;

use async_trait::async_trait;
use gambit_rooms::{SettlementRequest, TokenAmount, WalletAddress};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ExternalError;

pub use auth::{DisabledVerifier, SharedSecretVerifier};
pub use ledger::InMemoryLedger;
pub use relayer::RelayerClient;

/// Verifies a signed session token and yields the wallet it was issued to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<WalletAddress, ExternalError>;
}

/// Reports a wallet's spendable token balance.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn balance_of(&self, wallet: &WalletAddress) -> Result<TokenAmount, ExternalError>;
}

/// Opaque id of a submitted settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHandle(pub String);

/// Records finished games on the chain.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn submit_result(
        &self,
        request: &SettlementRequest,
    ) -> Result<TransactionHandle, ExternalError>;

    /// Waits until the transaction is final. Implementations must give up
    /// with [`ExternalError::Timeout`] after `timeout_ms`.
    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        timeout_ms: u64,
    ) -> Result<(), ExternalError>;
}

/// The full set of collaborators handed to the dispatcher.
#[derive(Clone)]
pub struct Capabilities {
    pub verifier: Arc<dyn TokenVerifier>,
    pub balances: Arc<dyn BalanceOracle>,
    pub settlement: Arc<dyn SettlementGateway>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

impl Capabilities {
    /// In-memory ledger for balances and settlement, with the given verifier.
    pub fn in_memory(ledger: Arc<InMemoryLedger>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            balances: ledger.clone(),
            settlement: ledger,
        }
    }
}

/// Bounds an external call. Elapsing yields [`ExternalError::Timeout`]
/// naming `what`.
pub async fn with_timeout<T, F>(what: &str, timeout_ms: u64, call: F) -> Result<T, ExternalError>
where
    F: Future<Output = Result<T, ExternalError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Ok(result) => result,
        Err(_) => Err(ExternalError::Timeout(what.to_string())),
    }
}
