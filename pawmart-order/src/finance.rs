use crate::models::{Invoice, InvoiceStatus, Order, OrderStatus};
use crate::repository::OrderLedger;
use pawmart_core::{CheckoutError, CheckoutResult};
use std::sync::Arc;

/// Handles invoice finalization for orders.
///
/// `finalize` is idempotent per order: the ledger rejects a second invoice
/// insert for the same order by returning the stored one, so a retried
/// finalization after a crash never produces a duplicate or a different
/// invoice number.
#[derive(Clone)]
pub struct FinancialManager {
    ledger: Arc<dyn OrderLedger>,
}

impl FinancialManager {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    /// Produce the 1:1 invoice for an order that reached PendingPayment or
    /// Paid. The order's total invariant is re-checked first; an order that
    /// fails it is never invoiced.
    pub async fn finalize(&self, order: &Order) -> CheckoutResult<Invoice> {
        order.verify_total()?;

        let payment_status = match order.status {
            OrderStatus::Paid => InvoiceStatus::Paid,
            OrderStatus::PendingPayment => InvoiceStatus::Pending,
            OrderStatus::Created | OrderStatus::Failed | OrderStatus::Cancelled => {
                return Err(CheckoutError::Validation(format!(
                    "order {} cannot be invoiced from status {}",
                    order.id, order.status
                )));
            }
        };

        let invoice = Invoice::from_order(order, payment_status);
        let stored = self.ledger.create_invoice(&invoice).await?;

        // A pending invoice issued earlier (manual channel) catches up with
        // the order once payment is confirmed. A Paid invoice is immutable;
        // mark_invoice_paid is a no-op for it.
        if payment_status == InvoiceStatus::Paid && stored.payment_status != InvoiceStatus::Paid {
            return self.ledger.mark_invoice_paid(order.id).await;
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, PaymentMethod};
    use crate::repository::MemoryOrderLedger;
    use pawmart_pricing::engine::PricingResult;
    use pawmart_shared::pii::Masked;

    fn paid_order() -> Order {
        let pricing = PricingResult {
            subtotal_cents: 5_000,
            coupon_discount_cents: 500,
            membership_discount_cents: 450,
            shipping_fee_cents: 1_000,
            shipping_waiver: None,
            total_cents: 5_050,
        };
        let mut order = Order::new(
            CustomerInfo {
                user_id: "u1".to_string(),
                name: "Sam".to_string(),
                email: Masked("sam@example.com".to_string()),
                shipping_address: "1 Bark Lane".to_string(),
            },
            vec![],
            &pricing,
            None,
            None,
            None,
            PaymentMethod::Wallet,
        );
        order.update_status(OrderStatus::Paid);
        order
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let finance = FinancialManager::new(ledger.clone());
        let order = paid_order();
        ledger.create_order(&order).await.unwrap();

        let first = finance.finalize(&order).await.unwrap();
        let second = finance.finalize(&order).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.invoice_number, second.invoice_number);
        assert_eq!(second.payment_status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn pending_invoice_catches_up_when_order_is_paid() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let finance = FinancialManager::new(ledger.clone());
        let mut order = paid_order();
        order.update_status(OrderStatus::PendingPayment);
        ledger.create_order(&order).await.unwrap();

        let pending = finance.finalize(&order).await.unwrap();
        assert_eq!(pending.payment_status, InvoiceStatus::Pending);

        order.update_status(OrderStatus::Paid);
        let paid = finance.finalize(&order).await.unwrap();
        assert_eq!(paid.id, pending.id);
        assert_eq!(paid.payment_status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn created_order_cannot_be_invoiced() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let finance = FinancialManager::new(ledger.clone());
        let mut order = paid_order();
        order.update_status(OrderStatus::Created);

        let err = finance.finalize(&order).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }
}
