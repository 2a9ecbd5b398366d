use crate::finance::FinancialManager;
use crate::manager;
use crate::models::{OrderChange, OrderStatus};
use crate::repository::OrderLedger;
use chrono::Utc;
use pawmart_core::gateway::{PaymentGateway, SessionStatus};
use pawmart_core::{CheckoutError, CheckoutResult};
use pawmart_shared::events::{OrderPaidEvent, SettlementRecordedEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Watches one pending gateway session: a repeating task bounded by a
/// deadline, started when the session is created and cancelled when a
/// terminal status is observed or the caller abandons the flow.
///
/// A timed-out watch leaves the order in PendingPayment; declaring it Failed
/// is the reconciliation sweep's call, never the poller's.
pub struct SessionPoller {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn OrderLedger>,
    finance: FinancialManager,
    interval: Duration,
    timeout: Duration,
}

/// Handle on a running watch task. Dropping it detaches the task; `cancel`
/// is the caller-abandonment trigger.
pub struct PollerHandle {
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the watch to finish on its own. Returns once the task has
    /// stopped, whether it completed or was cancelled.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}

impl SessionPoller {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn OrderLedger>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            finance: FinancialManager::new(Arc::clone(&ledger)),
            gateway,
            ledger,
            interval,
            timeout,
        }
    }

    /// Spawn the watch task for one pending order.
    pub fn watch(self: &Arc<Self>, order_id: Uuid, gateway_ref: String) -> PollerHandle {
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            poller.run(order_id, gateway_ref).await;
        });
        PollerHandle { handle }
    }

    async fn run(&self, order_id: Uuid, gateway_ref: String) {
        let deadline = Instant::now() + self.timeout;
        loop {
            sleep(self.interval).await;
            if Instant::now() >= deadline {
                warn!(
                    order_id = %order_id,
                    gateway_ref = %gateway_ref,
                    "session watch timed out; order stays pending for reconciliation"
                );
                break;
            }

            let session = match self.gateway.fetch_session(&gateway_ref).await {
                Ok(session) => session,
                Err(err) => {
                    // Transient poll failures never fail the order.
                    warn!(order_id = %order_id, %err, "session poll failed, retrying");
                    continue;
                }
            };

            if !session.status.is_terminal() {
                continue;
            }

            if let Err(err) = self.apply_terminal_status(order_id, session.status).await {
                error!(order_id = %order_id, %err, "failed to apply terminal session status");
            }
            break;
        }
    }

    /// One reconciliation-style check: fetch the session a single time and
    /// settle the order if it reached a terminal status. Returns whether it
    /// did.
    pub async fn reconcile_once(&self, order_id: Uuid, gateway_ref: &str) -> CheckoutResult<bool> {
        let session = self.gateway.fetch_session(gateway_ref).await?;
        if !session.status.is_terminal() {
            return Ok(false);
        }
        self.apply_terminal_status(order_id, session.status).await?;
        Ok(true)
    }

    /// Move a pending order to the state its session reached. Shared with
    /// the reconciliation sweep; a no-op when the order already left
    /// PendingPayment through another path.
    pub async fn apply_terminal_status(
        &self,
        order_id: Uuid,
        status: SessionStatus,
    ) -> CheckoutResult<()> {
        let mut order = self
            .ledger
            .get_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::Internal(format!("order {} not found", order_id)))?;
        if order.status != OrderStatus::PendingPayment {
            return Ok(());
        }
        let from = order.status;

        match status {
            SessionStatus::Pending => Ok(()),
            SessionStatus::Completed => {
                manager::mark_paid(&mut order)?;
                self.ledger.update_status(order.id, OrderStatus::Paid).await?;
                self.ledger
                    .add_order_change(&OrderChange::transition(
                        order.id,
                        "PAYMENT_RECEIVED",
                        from,
                        OrderStatus::Paid,
                        "SYSTEM",
                        Some("gateway session completed".to_string()),
                    ))
                    .await?;

                let paid = OrderPaidEvent {
                    order_id: order.id,
                    customer_id: order.customer.user_id.clone(),
                    total_cents: order.total_cents,
                    payment_method: order.payment_method.to_string(),
                    timestamp: Utc::now().timestamp(),
                };
                info!(target: "pawmart::events", event = ?paid, "order paid");
                let settled = SettlementRecordedEvent {
                    order_id: order.id,
                    amount_cents: order.total_cents,
                    channel: order.payment_method.to_string(),
                    event_type: "PAYMENT".to_string(),
                    timestamp: Utc::now().timestamp(),
                };
                info!(target: "pawmart::events", event = ?settled, "settlement recorded");

                self.finance.finalize(&order).await?;
                Ok(())
            }
            SessionStatus::Failed => {
                manager::mark_failed(&mut order)?;
                self.ledger
                    .update_status(order.id, OrderStatus::Failed)
                    .await?;
                self.ledger
                    .add_order_change(&OrderChange::transition(
                        order.id,
                        "PAYMENT_FAILED",
                        from,
                        OrderStatus::Failed,
                        "SYSTEM",
                        Some("gateway session failed".to_string()),
                    ))
                    .await?;
                Ok(())
            }
            SessionStatus::Cancelled => {
                manager::cancel(&mut order)?;
                self.ledger
                    .update_status(order.id, OrderStatus::Cancelled)
                    .await?;
                self.ledger
                    .add_order_change(&OrderChange::transition(
                        order.id,
                        "PAYMENT_CANCELLED",
                        from,
                        OrderStatus::Cancelled,
                        "SYSTEM",
                        Some("gateway session cancelled".to_string()),
                    ))
                    .await?;
                Ok(())
            }
        }
    }
}
