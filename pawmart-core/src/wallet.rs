use crate::{CheckoutError, CheckoutResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Contract with the external wallet service. The service owns balance
/// durability and concurrency control; this engine only reads fresh values
/// and requests debits.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Current balance in cents. Callers must treat the value as stale the
    /// moment it is returned; settlement re-reads immediately before the
    /// debit decision.
    async fn balance(&self, user_id: &str) -> CheckoutResult<i64>;

    /// Debit the wallet. The service rejects debits that would overdraw.
    async fn debit(&self, user_id: &str, amount_cents: i64) -> CheckoutResult<()>;
}

/// In-process wallet used by tests and local development.
pub struct MockWalletService {
    balances: Mutex<HashMap<String, i64>>,
}

impl MockWalletService {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_balance(&self, user_id: &str, amount_cents: i64) {
        self.balances
            .lock()
            .await
            .insert(user_id.to_string(), amount_cents);
    }
}

impl Default for MockWalletService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletService for MockWalletService {
    async fn balance(&self, user_id: &str) -> CheckoutResult<i64> {
        Ok(*self.balances.lock().await.get(user_id).unwrap_or(&0))
    }

    async fn debit(&self, user_id: &str, amount_cents: i64) -> CheckoutResult<()> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(user_id.to_string()).or_insert(0);
        if *balance < amount_cents {
            return Err(CheckoutError::InsufficientFunds {
                balance_cents: *balance,
                total_cents: amount_cents,
            });
        }
        *balance -= amount_cents;
        Ok(())
    }
}
