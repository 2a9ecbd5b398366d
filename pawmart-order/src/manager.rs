use crate::models::{Order, OrderStatus};

/// Guarded state transitions for the order lifecycle:
/// `Created → PendingPayment → {Paid | Failed | Cancelled}`, with the wallet
/// channel allowed to settle `Created → Paid` directly because its debit and
/// confirmation are one synchronous unit.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<OrderError> for pawmart_core::CheckoutError {
    fn from(err: OrderError) -> Self {
        pawmart_core::CheckoutError::Validation(err.to_string())
    }
}

fn invalid(order: &Order, to: OrderStatus) -> OrderError {
    OrderError::InvalidTransition {
        from: order.status.to_string(),
        to: to.to_string(),
    }
}

/// Transition: Created → PendingPayment (settlement handed to an
/// asynchronous or manually-verified channel).
pub fn begin_payment(order: &mut Order) -> Result<(), OrderError> {
    if order.status != OrderStatus::Created {
        return Err(invalid(order, OrderStatus::PendingPayment));
    }
    order.update_status(OrderStatus::PendingPayment);
    Ok(())
}

/// Transition to Paid. Reached from PendingPayment when an asynchronous
/// channel reports completion, or directly from Created for the wallet.
pub fn mark_paid(order: &mut Order) -> Result<(), OrderError> {
    if !matches!(
        order.status,
        OrderStatus::Created | OrderStatus::PendingPayment
    ) {
        return Err(invalid(order, OrderStatus::Paid));
    }
    order.update_status(OrderStatus::Paid);
    Ok(())
}

/// Transition: PendingPayment → Failed (channel reported a terminal
/// failure). A timed-out session does NOT take this path; it stays pending
/// for reconciliation.
pub fn mark_failed(order: &mut Order) -> Result<(), OrderError> {
    if order.status != OrderStatus::PendingPayment {
        return Err(invalid(order, OrderStatus::Failed));
    }
    order.update_status(OrderStatus::Failed);
    Ok(())
}

/// Transition to Cancelled, from Created or PendingPayment.
pub fn cancel(order: &mut Order) -> Result<(), OrderError> {
    if !matches!(
        order.status,
        OrderStatus::Created | OrderStatus::PendingPayment
    ) {
        return Err(invalid(order, OrderStatus::Cancelled));
    }
    order.update_status(OrderStatus::Cancelled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, PaymentMethod};
    use pawmart_pricing::engine::PricingResult;
    use pawmart_shared::pii::Masked;

    fn order(method: PaymentMethod) -> Order {
        let pricing = PricingResult {
            subtotal_cents: 5_000,
            coupon_discount_cents: 0,
            membership_discount_cents: 0,
            shipping_fee_cents: 1_000,
            shipping_waiver: None,
            total_cents: 6_000,
        };
        Order::new(
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
            method,
        )
    }

    #[test]
    fn gateway_lifecycle() {
        let mut order = order(PaymentMethod::CardGateway);
        begin_payment(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        mark_paid(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn wallet_settles_directly_from_created() {
        let mut order = order(PaymentMethod::Wallet);
        mark_paid(&mut order).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn paid_is_terminal() {
        let mut order = order(PaymentMethod::CardGateway);
        begin_payment(&mut order).unwrap();
        mark_paid(&mut order).unwrap();

        assert!(mark_failed(&mut order).is_err());
        assert!(cancel(&mut order).is_err());
        assert!(begin_payment(&mut order).is_err());
    }

    #[test]
    fn failed_requires_pending() {
        let mut order = order(PaymentMethod::CardGateway);
        let err = mark_failed(&mut order).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }
}
