use crate::finance::FinancialManager;
use crate::models::{Order, OrderChange, PaymentMethod};
use crate::repository::OrderLedger;
use crate::settlement::{
    GatewaySettlement, ManualConfirmationSettlement, SettlementOutcome, TransferAttestation,
    WalletSettlement,
};
use pawmart_core::gateway::PaymentGateway;
use pawmart_core::wallet::WalletService;
use pawmart_core::{CheckoutError, CheckoutResult};
use std::sync::Arc;

/// Routes an order to the settlement handler for its payment method and
/// owns the persistence ordering around it: the pricing snapshot is written
/// before any settlement attempt, so the charge amount stays auditable no
/// matter what the channel later reports.
///
/// The match over `PaymentMethod` is exhaustive with no default arm; adding
/// a method without a handler fails to compile.
pub struct PaymentDispatcher {
    ledger: Arc<dyn OrderLedger>,
    wallet: WalletSettlement,
    gateway: GatewaySettlement,
    manual: ManualConfirmationSettlement,
}

impl PaymentDispatcher {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        wallet: Arc<dyn WalletService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let finance = FinancialManager::new(Arc::clone(&ledger));
        Self {
            wallet: WalletSettlement::new(wallet, Arc::clone(&ledger), finance),
            gateway: GatewaySettlement::new(gateway, Arc::clone(&ledger)),
            manual: ManualConfirmationSettlement::new(Arc::clone(&ledger)),
            ledger,
        }
    }

    /// Persist a freshly priced order, then attempt settlement on its
    /// channel. A settlement failure leaves the order durably in `Created`;
    /// nothing is lost and nothing was charged.
    pub async fn place(
        &self,
        mut order: Order,
        attestation: Option<TransferAttestation>,
    ) -> CheckoutResult<(Order, SettlementOutcome)> {
        order.verify_total()?;
        self.ledger.create_order(&order).await?;
        self.ledger
            .add_order_change(&OrderChange::created(order.id, "CUSTOMER"))
            .await?;
        tracing::info!(
            order_id = %order.id,
            total_cents = order.total_cents,
            payment_method = %order.payment_method,
            "order created"
        );

        let outcome = self.settle(&mut order, attestation).await?;
        Ok((order, outcome))
    }

    /// Invoke the one settlement handler for the order's payment method.
    pub async fn settle(
        &self,
        order: &mut Order,
        attestation: Option<TransferAttestation>,
    ) -> CheckoutResult<SettlementOutcome> {
        match order.payment_method {
            PaymentMethod::Wallet => self.wallet.settle(order).await,
            PaymentMethod::CardGateway => self.gateway.settle(order).await,
            PaymentMethod::AttestedTransfer => {
                let attestation = attestation.ok_or_else(|| {
                    CheckoutError::Validation(
                        "attested transfer requires a transaction reference and account"
                            .to_string(),
                    )
                })?;
                self.manual.settle_attested(order, attestation).await
            }
            PaymentMethod::SelfAttestedQr => self.manual.settle_self_attested(order).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, OrderStatus};
    use crate::repository::MemoryOrderLedger;
    use pawmart_core::gateway::MockPaymentGateway;
    use pawmart_core::wallet::MockWalletService;
    use pawmart_pricing::engine::PricingResult;
    use pawmart_shared::pii::Masked;

    fn order(method: PaymentMethod) -> Order {
        let pricing = PricingResult {
            subtotal_cents: 4_050,
            coupon_discount_cents: 0,
            membership_discount_cents: 0,
            shipping_fee_cents: 1_000,
            shipping_waiver: None,
            total_cents: 5_050,
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

    fn dispatcher(
        ledger: &Arc<MemoryOrderLedger>,
        wallet: &Arc<MockWalletService>,
        gateway: &Arc<MockPaymentGateway>,
    ) -> PaymentDispatcher {
        PaymentDispatcher::new(ledger.clone(), wallet.clone(), gateway.clone())
    }

    #[tokio::test]
    async fn snapshot_is_durable_before_settlement_fails() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        wallet.set_balance("u1", 3_000).await;
        let dispatcher = dispatcher(&ledger, &wallet, &gateway);

        let order = order(PaymentMethod::Wallet);
        let order_id = order.id;
        let err = dispatcher.place(order, None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientFunds { .. }));

        // The pricing snapshot survived the failed settlement attempt.
        let stored = ledger.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert_eq!(stored.total_cents, 5_050);
        let changes = ledger.changes_for(order_id).await;
        assert!(changes.iter().any(|c| c.change_type == "ORDER_CREATED"));
    }

    #[tokio::test]
    async fn wallet_order_settles_inline() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        wallet.set_balance("u1", 10_000).await;
        let dispatcher = dispatcher(&ledger, &wallet, &gateway);

        let (order, outcome) = dispatcher
            .place(order(PaymentMethod::Wallet), None)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(matches!(outcome, SettlementOutcome::Paid { .. }));
    }

    #[tokio::test]
    async fn attested_transfer_without_attestation_is_rejected() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let dispatcher = dispatcher(&ledger, &wallet, &gateway);

        let order = order(PaymentMethod::AttestedTransfer);
        let order_id = order.id;
        let err = dispatcher.place(order, None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let stored = ledger.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn each_method_reaches_its_own_handler() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        wallet.set_balance("u1", 100_000).await;
        let dispatcher = dispatcher(&ledger, &wallet, &gateway);

        let (_, wallet_outcome) = dispatcher
            .place(order(PaymentMethod::Wallet), None)
            .await
            .unwrap();
        assert!(matches!(wallet_outcome, SettlementOutcome::Paid { .. }));

        let (_, gateway_outcome) = dispatcher
            .place(order(PaymentMethod::CardGateway), None)
            .await
            .unwrap();
        assert!(matches!(
            gateway_outcome,
            SettlementOutcome::RedirectToGateway { .. }
        ));

        let (_, transfer_outcome) = dispatcher
            .place(
                order(PaymentMethod::AttestedTransfer),
                Some(TransferAttestation {
                    reference: "0xfeed".to_string(),
                    account: "acct-1".to_string(),
                }),
            )
            .await
            .unwrap();
        assert!(matches!(
            transfer_outcome,
            SettlementOutcome::AwaitingVerification
        ));

        let (_, qr_outcome) = dispatcher
            .place(order(PaymentMethod::SelfAttestedQr), None)
            .await
            .unwrap();
        assert!(matches!(qr_outcome, SettlementOutcome::AwaitingVerification));
    }
}
