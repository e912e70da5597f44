//! In-memory stand-in for the token contract.
//!
//! Used when no relayer is configured and throughout the tests. Balances
//! live in a map. A settlement debits each bettor's stake, credits the
//! payouts, and is confirmed immediately; the house fee leaves circulation.

use async_trait::async_trait;
use dashmap::DashMap;
use gambit_rooms::{SettlementRequest, TokenAmount, WalletAddress};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::info;

use super::{BalanceOracle, SettlementGateway, TransactionHandle};
use crate::error::ExternalError;

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: DashMap<WalletAddress, TokenAmount>,
    /// Balance reported for wallets never credited explicitly.
    default_balance: TokenAmount,
    settlements: DashMap<String, SettlementRequest>,
    next_nonce: AtomicU64,
    failures_pending: AtomicU32,
}

impl InMemoryLedger {
    pub fn new(default_balance: TokenAmount) -> Self {
        Self {
            default_balance,
            ..Self::default()
        }
    }

    pub fn set_balance(&self, wallet: WalletAddress, amount: TokenAmount) {
        self.balances.insert(wallet, amount);
    }

    /// Makes the next `count` submissions fail with a retryable error.
    pub fn fail_next_submissions(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Every settlement accepted so far.
    pub fn settlements(&self) -> Vec<SettlementRequest> {
        self.settlements.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl BalanceOracle for InMemoryLedger {
    async fn balance_of(&self, wallet: &WalletAddress) -> Result<TokenAmount, ExternalError> {
        Ok(self
            .balances
            .get(wallet)
            .map(|b| *b)
            .unwrap_or(self.default_balance))
    }
}

#[async_trait]
impl SettlementGateway for InMemoryLedger {
    async fn submit_result(
        &self,
        request: &SettlementRequest,
    ) -> Result<TransactionHandle, ExternalError> {
        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExternalError::Unavailable("ledger offline".to_string()));
        }

        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let digest = Sha256::digest(format!("{}:{nonce}", request.room_id).as_bytes());
        let transaction = format!("0x{}", hex::encode(digest));

        for bettor in &request.bettors {
            let balance = self.balance_of(bettor).await?;
            self.balances
                .insert(bettor.clone(), balance.saturating_sub(request.stake));
        }
        for payout in &request.payouts {
            let balance = self.balance_of(&payout.wallet).await?;
            let credited = TokenAmount::new(balance.units().saturating_add(payout.amount.units()));
            self.balances.insert(payout.wallet.clone(), credited);
        }
        self.settlements.insert(transaction.clone(), request.clone());
        info!(room_id = %request.room_id, %transaction, "📒 Settlement recorded in memory");
        Ok(TransactionHandle(transaction))
    }

    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        _timeout_ms: u64,
    ) -> Result<(), ExternalError> {
        if self.settlements.contains_key(&handle.0) {
            Ok(())
        } else {
            Err(ExternalError::Rejected(format!(
                "unknown transaction {}",
                handle.0
            )))
        }
    }
}
