use crate::models::{Invoice, InvoiceStatus, ManualClaim, Order, OrderChange, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pawmart_core::{CheckoutError, CheckoutResult};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Persistence contract for orders and invoices. Implementations enforce the
/// structural invariants: the pricing snapshot is written before any
/// settlement attempt, one invoice per order, and a Paid invoice is never
/// mutated again.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Persist a freshly created order with its full pricing snapshot.
    async fn create_order(&self, order: &Order) -> CheckoutResult<()>;

    async fn get_order(&self, id: Uuid) -> CheckoutResult<Option<Order>>;

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> CheckoutResult<()>;

    /// Durably record the customer's claim on a manually-verified channel.
    async fn record_manual_claim(&self, id: Uuid, claim: &ManualClaim) -> CheckoutResult<()>;

    /// Remember the gateway session reference attached to a pending order.
    async fn record_gateway_ref(&self, id: Uuid, gateway_ref: &str) -> CheckoutResult<()>;

    /// Append an audit record; never updated or deleted.
    async fn add_order_change(&self, change: &OrderChange) -> CheckoutResult<()>;

    /// Orders still in PendingPayment whose last update predates `cutoff`;
    /// input to the reconciliation sweep.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CheckoutResult<Vec<Order>>;

    /// Paid orders whose invoice insert never landed. The reconciliation
    /// sweep re-finalizes these.
    async fn list_paid_missing_invoice(&self) -> CheckoutResult<Vec<Order>>;

    /// Manual-channel orders waiting for out-of-band verification, for
    /// back-office review tooling.
    async fn list_awaiting_verification(&self) -> CheckoutResult<Vec<Order>>;

    /// Insert the invoice for an order. Idempotent on order id: when an
    /// invoice already exists the stored one is returned unchanged.
    async fn create_invoice(&self, invoice: &Invoice) -> CheckoutResult<Invoice>;

    async fn invoice_for_order(&self, order_id: Uuid) -> CheckoutResult<Option<Invoice>>;

    /// Move an invoice to Paid. A no-op when it is already Paid.
    async fn mark_invoice_paid(&self, order_id: Uuid) -> CheckoutResult<Invoice>;
}

/// HashMap-backed ledger for tests and local development. Enforces the same
/// structural invariants as the Postgres implementation.
pub struct MemoryOrderLedger {
    orders: Mutex<HashMap<Uuid, Order>>,
    invoices: Mutex<HashMap<Uuid, Invoice>>,
    changes: Mutex<Vec<OrderChange>>,
}

impl MemoryOrderLedger {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            invoices: Mutex::new(HashMap::new()),
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Audit trail for one order, oldest first.
    pub async fn changes_for(&self, order_id: Uuid) -> Vec<OrderChange> {
        self.changes
            .lock()
            .await
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryOrderLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderLedger for MemoryOrderLedger {
    async fn create_order(&self, order: &Order) -> CheckoutResult<()> {
        order.verify_total()?;
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.id) {
            return Err(CheckoutError::Internal(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CheckoutResult<Option<Order>> {
        match self.orders.lock().await.get(&id) {
            Some(order) => {
                if let Err(err) = order.verify_total() {
                    tracing::error!(order_id = %id, %err, "stored order fails its total invariant");
                    return Err(err);
                }
                Ok(Some(order.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> CheckoutResult<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CheckoutError::Internal(format!("order {} not found", id)))?;
        order.update_status(status);
        Ok(())
    }

    async fn record_manual_claim(&self, id: Uuid, claim: &ManualClaim) -> CheckoutResult<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CheckoutError::Internal(format!("order {} not found", id)))?;
        order.manual_claim = Some(claim.clone());
        Ok(())
    }

    async fn record_gateway_ref(&self, id: Uuid, gateway_ref: &str) -> CheckoutResult<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| CheckoutError::Internal(format!("order {} not found", id)))?;
        order.gateway_ref = Some(gateway_ref.to_string());
        Ok(())
    }

    async fn add_order_change(&self, change: &OrderChange) -> CheckoutResult<()> {
        self.changes.lock().await.push(change.clone());
        Ok(())
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CheckoutResult<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn list_paid_missing_invoice(&self) -> CheckoutResult<Vec<Order>> {
        let invoices = self.invoices.lock().await;
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::Paid && !invoices.contains_key(&o.id))
            .cloned()
            .collect())
    }

    async fn list_awaiting_verification(&self) -> CheckoutResult<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| o.awaiting_verification())
            .cloned()
            .collect())
    }

    async fn create_invoice(&self, invoice: &Invoice) -> CheckoutResult<Invoice> {
        let mut invoices = self.invoices.lock().await;
        if let Some(existing) = invoices.get(&invoice.order_id) {
            return Ok(existing.clone());
        }
        invoices.insert(invoice.order_id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn invoice_for_order(&self, order_id: Uuid) -> CheckoutResult<Option<Invoice>> {
        Ok(self.invoices.lock().await.get(&order_id).cloned())
    }

    async fn mark_invoice_paid(&self, order_id: Uuid) -> CheckoutResult<Invoice> {
        let mut invoices = self.invoices.lock().await;
        let invoice = invoices
            .get_mut(&order_id)
            .ok_or_else(|| CheckoutError::Internal(format!("no invoice for order {}", order_id)))?;
        if invoice.payment_status != InvoiceStatus::Paid {
            invoice.payment_status = InvoiceStatus::Paid;
        }
        Ok(invoice.clone())
    }
}
