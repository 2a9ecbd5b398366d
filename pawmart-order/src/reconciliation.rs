use crate::finance::FinancialManager;
use crate::models::{OrderChange, OrderStatus};
use crate::poller::SessionPoller;
use crate::repository::OrderLedger;
use chrono::{Duration, Utc};
use pawmart_core::CheckoutResult;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub settled: usize,
    pub flagged: usize,
    pub invoices_recovered: usize,
}

/// Periodic recovery path for orders the happy path left behind: gateway
/// orders stuck in PendingPayment past the poll timeout, and Paid orders
/// whose invoice insert failed.
///
/// A stuck order is never auto-failed. The sweep re-fetches its session once
/// per pass; a terminal status settles it normally, anything else flags the
/// order for back-office review. Manual-channel orders are skipped; their
/// verification is out of band and has no deadline.
pub struct ReconciliationSweep {
    ledger: Arc<dyn OrderLedger>,
    poller: Arc<SessionPoller>,
    finance: FinancialManager,
    pending_cutoff: Duration,
}

impl ReconciliationSweep {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        poller: Arc<SessionPoller>,
        pending_cutoff: Duration,
    ) -> Self {
        Self {
            finance: FinancialManager::new(Arc::clone(&ledger)),
            ledger,
            poller,
            pending_cutoff,
        }
    }

    pub async fn run(&self) -> CheckoutResult<ReconciliationReport> {
        let mut report = ReconciliationReport::default();
        let cutoff = Utc::now() - self.pending_cutoff;

        for order in self.ledger.list_pending_before(cutoff).await? {
            if order.awaiting_verification() {
                continue;
            }

            let Some(gateway_ref) = order.gateway_ref.clone() else {
                self.flag(order.id, "pending past timeout with no gateway session")
                    .await?;
                report.flagged += 1;
                continue;
            };

            match self.poller.reconcile_once(order.id, &gateway_ref).await {
                Ok(true) => report.settled += 1,
                Ok(false) => {
                    self.flag(order.id, "gateway session still pending past timeout")
                        .await?;
                    report.flagged += 1;
                }
                Err(err) => {
                    warn!(order_id = %order.id, %err, "reconciliation fetch failed");
                    self.flag(order.id, "gateway session unreachable during sweep")
                        .await?;
                    report.flagged += 1;
                }
            }
        }

        for order in self.ledger.list_paid_missing_invoice().await? {
            self.finance.finalize(&order).await?;
            info!(order_id = %order.id, "recovered missing invoice");
            report.invoices_recovered += 1;
        }

        Ok(report)
    }

    async fn flag(&self, order_id: Uuid, note: &str) -> CheckoutResult<()> {
        warn!(order_id = %order_id, note, "order flagged for back-office review");
        self.ledger
            .add_order_change(&OrderChange::transition(
                order_id,
                "RECONCILIATION_FLAGGED",
                OrderStatus::PendingPayment,
                OrderStatus::PendingPayment,
                "SYSTEM",
                Some(note.to_string()),
            ))
            .await
    }
}
