use crate::finance::FinancialManager;
use crate::manager;
use crate::models::{Invoice, ManualClaim, Order, OrderChange, OrderStatus};
use crate::repository::OrderLedger;
use chrono::Utc;
use pawmart_core::gateway::PaymentGateway;
use pawmart_core::wallet::WalletService;
use pawmart_core::{CheckoutError, CheckoutResult};
use pawmart_shared::events::{OrderPaidEvent, PaymentClaimRecordedEvent, SettlementRecordedEvent};
use std::sync::Arc;

/// What one settlement attempt produced. Each payment channel terminates a
/// checkout request in exactly one of these shapes.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// Synchronous channel settled in full; the invoice exists.
    Paid { invoice: Invoice },
    /// Asynchronous channel opened a session; the caller is redirected and
    /// the order waits in PendingPayment.
    RedirectToGateway {
        gateway_ref: String,
        payment_url: String,
    },
    /// Manually-verified channel recorded the customer's claim; confirmation
    /// happens out of band.
    AwaitingVerification,
}

/// Externally-generated proof of payment for the attested-transfer channel.
#[derive(Debug, Clone)]
pub struct TransferAttestation {
    pub reference: String,
    pub account: String,
}

fn not_payable(order: &Order) -> CheckoutError {
    CheckoutError::Validation(format!(
        "order {} is not payable from status {}",
        order.id, order.status
    ))
}

/// Wallet channel: synchronous, strongly consistent, all-or-nothing.
pub struct WalletSettlement {
    wallet: Arc<dyn WalletService>,
    ledger: Arc<dyn OrderLedger>,
    finance: FinancialManager,
}

impl WalletSettlement {
    pub fn new(
        wallet: Arc<dyn WalletService>,
        ledger: Arc<dyn OrderLedger>,
        finance: FinancialManager,
    ) -> Self {
        Self {
            wallet,
            ledger,
            finance,
        }
    }

    /// Debit the wallet and settle the order as one logical unit.
    ///
    /// The balance is re-fetched here, immediately before the debit
    /// decision; a balance read earlier in the session must never reach this
    /// point. On `InsufficientFunds` no debit has occurred and the order
    /// stays `Created`.
    pub async fn settle(&self, order: &mut Order) -> CheckoutResult<SettlementOutcome> {
        if order.status != OrderStatus::Created {
            return Err(not_payable(order));
        }

        let fresh_balance = self.wallet.balance(&order.customer.user_id).await?;
        if fresh_balance < order.total_cents {
            return Err(CheckoutError::InsufficientFunds {
                balance_cents: fresh_balance,
                total_cents: order.total_cents,
            });
        }

        self.wallet
            .debit(&order.customer.user_id, order.total_cents)
            .await?;

        let from = order.status;
        manager::mark_paid(order)?;
        self.ledger.update_status(order.id, OrderStatus::Paid).await?;
        self.ledger
            .add_order_change(&OrderChange::transition(
                order.id,
                "PAYMENT_RECEIVED",
                from,
                OrderStatus::Paid,
                "SYSTEM",
                Some("wallet debit settled inline".to_string()),
            ))
            .await?;

        let paid = OrderPaidEvent {
            order_id: order.id,
            customer_id: order.customer.user_id.clone(),
            total_cents: order.total_cents,
            payment_method: order.payment_method.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "pawmart::events", event = ?paid, "order paid");
        let settled = SettlementRecordedEvent {
            order_id: order.id,
            amount_cents: order.total_cents,
            channel: order.payment_method.to_string(),
            event_type: "PAYMENT".to_string(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "pawmart::events", event = ?settled, "settlement recorded");

        let invoice = self.finance.finalize(order).await?;
        Ok(SettlementOutcome::Paid { invoice })
    }
}

/// Card gateway channel: asynchronous, eventually consistent. Creates the
/// session and parks the order in PendingPayment; the poller or the
/// reconciliation sweep observes the terminal status later.
pub struct GatewaySettlement {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn OrderLedger>,
}

impl GatewaySettlement {
    pub fn new(gateway: Arc<dyn PaymentGateway>, ledger: Arc<dyn OrderLedger>) -> Self {
        Self { gateway, ledger }
    }

    pub async fn settle(&self, order: &mut Order) -> CheckoutResult<SettlementOutcome> {
        if order.status != OrderStatus::Created {
            return Err(not_payable(order));
        }

        let session = self
            .gateway
            .create_session(order.id, order.total_cents, order.customer.email.inner())
            .await?;

        let from = order.status;
        manager::begin_payment(order)?;
        self.ledger
            .update_status(order.id, OrderStatus::PendingPayment)
            .await?;
        self.ledger
            .record_gateway_ref(order.id, &session.gateway_ref)
            .await?;
        order.gateway_ref = Some(session.gateway_ref.clone());
        self.ledger
            .add_order_change(&OrderChange::transition(
                order.id,
                "GATEWAY_SESSION_CREATED",
                from,
                OrderStatus::PendingPayment,
                "SYSTEM",
                Some(format!("session {}", session.gateway_ref)),
            ))
            .await?;

        tracing::info!(
            order_id = %order.id,
            gateway_ref = %session.gateway_ref,
            "payment session created, awaiting gateway"
        );

        Ok(SettlementOutcome::RedirectToGateway {
            gateway_ref: session.gateway_ref,
            payment_url: session.payment_url,
        })
    }
}

/// Manually-verified channels. The engine cannot confirm these payments
/// itself; its responsibility ends at durably recording the claim.
pub struct ManualConfirmationSettlement {
    ledger: Arc<dyn OrderLedger>,
}

impl ManualConfirmationSettlement {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    /// Attested-transfer channel: the customer supplies an external
    /// transaction reference and account identifier.
    pub async fn settle_attested(
        &self,
        order: &mut Order,
        attestation: TransferAttestation,
    ) -> CheckoutResult<SettlementOutcome> {
        if attestation.reference.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "transfer reference is required".to_string(),
            ));
        }
        if attestation.account.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "transfer account is required".to_string(),
            ));
        }

        let claim = ManualClaim {
            reference: Some(attestation.reference),
            account: Some(attestation.account),
            attested_at: Utc::now(),
        };
        self.record(order, claim).await
    }

    /// QR/self-attested channel: the customer self-attests completion; no
    /// external reference exists.
    pub async fn settle_self_attested(&self, order: &mut Order) -> CheckoutResult<SettlementOutcome> {
        let claim = ManualClaim {
            reference: None,
            account: None,
            attested_at: Utc::now(),
        };
        self.record(order, claim).await
    }

    async fn record(
        &self,
        order: &mut Order,
        claim: ManualClaim,
    ) -> CheckoutResult<SettlementOutcome> {
        if order.status != OrderStatus::Created {
            return Err(not_payable(order));
        }

        // The claim is written before the status moves so a crash between
        // the two leaves a Created order with its claim intact, never a
        // pending order with no claim.
        self.ledger.record_manual_claim(order.id, &claim).await?;
        order.manual_claim = Some(claim.clone());

        let from = order.status;
        manager::begin_payment(order)?;
        self.ledger
            .update_status(order.id, OrderStatus::PendingPayment)
            .await?;
        self.ledger
            .add_order_change(&OrderChange::transition(
                order.id,
                "PAYMENT_CLAIM_RECORDED",
                from,
                OrderStatus::PendingPayment,
                "CUSTOMER",
                claim.reference.clone(),
            ))
            .await?;

        let event = PaymentClaimRecordedEvent {
            order_id: order.id,
            reference: claim.reference.clone(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(target: "pawmart::events", event = ?event, "payment claim recorded");

        Ok(SettlementOutcome::AwaitingVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, PaymentMethod};
    use crate::repository::MemoryOrderLedger;
    use pawmart_core::gateway::MockPaymentGateway;
    use pawmart_core::wallet::MockWalletService;
    use pawmart_pricing::engine::PricingResult;
    use pawmart_shared::pii::Masked;

    fn order(method: PaymentMethod) -> Order {
        let pricing = PricingResult {
            subtotal_cents: 5_000,
            coupon_discount_cents: 500,
            membership_discount_cents: 450,
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

    fn wallet_settlement(
        ledger: &Arc<MemoryOrderLedger>,
        wallet: &Arc<MockWalletService>,
    ) -> WalletSettlement {
        let ledger: Arc<dyn OrderLedger> = ledger.clone();
        WalletSettlement::new(
            wallet.clone(),
            ledger.clone(),
            FinancialManager::new(ledger),
        )
    }

    #[tokio::test]
    async fn wallet_settlement_is_all_or_nothing() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        wallet.set_balance("u1", 3_000).await;
        let settlement = wallet_settlement(&ledger, &wallet);

        let mut order = order(PaymentMethod::Wallet);
        ledger.create_order(&order).await.unwrap();

        let err = settlement.settle(&mut order).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientFunds { .. }));

        // No debit occurred and the order never left Created.
        assert_eq!(wallet.balance("u1").await.unwrap(), 3_000);
        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert!(ledger.invoice_for_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wallet_settlement_debits_and_invoices() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        wallet.set_balance("u1", 10_000).await;
        let settlement = wallet_settlement(&ledger, &wallet);

        let mut order = order(PaymentMethod::Wallet);
        ledger.create_order(&order).await.unwrap();

        let outcome = settlement.settle(&mut order).await.unwrap();
        let SettlementOutcome::Paid { invoice } = outcome else {
            panic!("wallet settlement must settle inline");
        };

        assert_eq!(wallet.balance("u1").await.unwrap(), 4_950);
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(invoice.total_cents, 5_050);
        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);

        let changes = ledger.changes_for(order.id).await;
        assert!(changes.iter().any(|c| c.change_type == "PAYMENT_RECEIVED"));
    }

    #[tokio::test]
    async fn paid_order_cannot_be_settled_again() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let wallet = Arc::new(MockWalletService::new());
        wallet.set_balance("u1", 20_000).await;
        let settlement = wallet_settlement(&ledger, &wallet);

        let mut order = order(PaymentMethod::Wallet);
        ledger.create_order(&order).await.unwrap();
        settlement.settle(&mut order).await.unwrap();

        let err = settlement.settle(&mut order).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
        // The replay charged nothing.
        assert_eq!(wallet.balance("u1").await.unwrap(), 14_950);
    }

    #[tokio::test]
    async fn gateway_settlement_parks_the_order_pending() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let settlement = GatewaySettlement::new(gateway.clone(), ledger.clone());

        let mut order = order(PaymentMethod::CardGateway);
        ledger.create_order(&order).await.unwrap();

        let outcome = settlement.settle(&mut order).await.unwrap();
        let SettlementOutcome::RedirectToGateway {
            gateway_ref,
            payment_url,
        } = outcome
        else {
            panic!("gateway settlement must redirect");
        };
        assert!(payment_url.contains(&gateway_ref));

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::PendingPayment);
        assert_eq!(stored.gateway_ref.as_deref(), Some(gateway_ref.as_str()));
        assert!(ledger.invoice_for_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attested_transfer_records_the_claim() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let settlement = ManualConfirmationSettlement::new(ledger.clone());

        let mut order = order(PaymentMethod::AttestedTransfer);
        ledger.create_order(&order).await.unwrap();

        let outcome = settlement
            .settle_attested(
                &mut order,
                TransferAttestation {
                    reference: "0xabc123".to_string(),
                    account: "acct-77".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SettlementOutcome::AwaitingVerification));

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.awaiting_verification());
        let claim = stored.manual_claim.unwrap();
        assert_eq!(claim.reference.as_deref(), Some("0xabc123"));
        assert_eq!(claim.account.as_deref(), Some("acct-77"));

        let review = ledger.list_awaiting_verification().await.unwrap();
        assert_eq!(review.len(), 1);
    }

    #[tokio::test]
    async fn attested_transfer_requires_a_reference() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let settlement = ManualConfirmationSettlement::new(ledger.clone());

        let mut order = order(PaymentMethod::AttestedTransfer);
        ledger.create_order(&order).await.unwrap();

        let err = settlement
            .settle_attested(
                &mut order,
                TransferAttestation {
                    reference: "  ".to_string(),
                    account: "acct-77".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        // Rejection left no claim and no transition behind.
        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert!(stored.manual_claim.is_none());
    }

    #[tokio::test]
    async fn self_attested_qr_needs_no_reference() {
        let ledger = Arc::new(MemoryOrderLedger::new());
        let settlement = ManualConfirmationSettlement::new(ledger.clone());

        let mut order = order(PaymentMethod::SelfAttestedQr);
        ledger.create_order(&order).await.unwrap();

        let outcome = settlement.settle_self_attested(&mut order).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::AwaitingVerification));

        let stored = ledger.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.awaiting_verification());
        assert!(stored.manual_claim.unwrap().reference.is_none());
    }
}
