use chrono::{DateTime, Utc};
use pawmart_core::membership::TierName;
use pawmart_core::{CheckoutError, CheckoutResult};
use pawmart_pricing::engine::PricingResult;
use pawmart_pricing::shipping::WaiverReason;
use pawmart_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the settlement lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    PendingPayment,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(OrderStatus::Created),
            "PENDING_PAYMENT" => Some(OrderStatus::PendingPayment),
            "PAID" => Some(OrderStatus::Paid),
            "FAILED" => Some(OrderStatus::Failed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of payment channels. Dispatch is an exhaustive match, so a new
/// method without a handler is a compile-time error rather than a silent
/// no-op.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Wallet,
    CardGateway,
    AttestedTransfer,
    SelfAttestedQr,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::CardGateway => "CARD_GATEWAY",
            PaymentMethod::AttestedTransfer => "ATTESTED_TRANSFER",
            PaymentMethod::SelfAttestedQr => "SELF_ATTESTED_QR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WALLET" => Some(PaymentMethod::Wallet),
            "CARD_GATEWAY" => Some(PaymentMethod::CardGateway),
            "ATTESTED_TRANSFER" => Some(PaymentMethod::AttestedTransfer),
            "SELF_ATTESTED_QR" => Some(PaymentMethod::SelfAttestedQr),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub user_id: String,
    pub name: String,
    pub email: Masked<String>,
    pub shipping_address: String,
}

/// Snapshot of one cart line at checkout time. Prices are frozen here; later
/// catalog changes never affect a created order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

/// A customer's payment claim on a manually-verified channel. For attested
/// transfers the external reference and account are recorded; QR
/// self-attestation carries neither. The engine's responsibility ends at
/// durably recording this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualClaim {
    pub reference: Option<String>,
    pub account: Option<String>,
    pub attested_at: DateTime<Utc>,
}

/// The single source of truth for a customer's purchase. Monetary fields
/// never change after creation; only the status does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer: CustomerInfo,
    pub lines: Vec<OrderLine>,
    pub subtotal_cents: i64,
    pub coupon_discount_cents: i64,
    pub discount_code: Option<String>,
    pub membership_discount_cents: i64,
    pub membership_tier: Option<TierName>,
    pub shipping_fee_cents: i64,
    pub shipping_waiver: Option<WaiverReason>,
    pub free_delivery_code: Option<String>,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub manual_claim: Option<ManualClaim>,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        customer: CustomerInfo,
        lines: Vec<OrderLine>,
        pricing: &PricingResult,
        discount_code: Option<String>,
        membership_tier: Option<TierName>,
        free_delivery_code: Option<String>,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer,
            lines,
            subtotal_cents: pricing.subtotal_cents,
            coupon_discount_cents: pricing.coupon_discount_cents,
            discount_code,
            membership_discount_cents: pricing.membership_discount_cents,
            membership_tier,
            shipping_fee_cents: pricing.shipping_fee_cents,
            shipping_waiver: pricing.shipping_waiver,
            free_delivery_code,
            total_cents: pricing.total_cents,
            payment_method,
            status: OrderStatus::Created,
            manual_claim: None,
            gateway_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Recompute the total from the stored components.
    pub fn recompute_total(&self) -> i64 {
        (self.subtotal_cents - self.coupon_discount_cents - self.membership_discount_cents).max(0)
            + self.shipping_fee_cents
    }

    /// Check the total-reconciliation invariant. A mismatch means the record
    /// no longer describes what was charged and must never be silently
    /// corrected.
    pub fn verify_total(&self) -> CheckoutResult<()> {
        let derived = self.recompute_total();
        if derived != self.total_cents {
            return Err(CheckoutError::InconsistentState {
                order_id: self.id,
                stored_cents: self.total_cents,
                derived_cents: derived,
            });
        }
        Ok(())
    }

    /// A pending order on a manual channel that has recorded its claim and
    /// is waiting for out-of-band verification.
    pub fn awaiting_verification(&self) -> bool {
        self.status == OrderStatus::PendingPayment && self.manual_claim.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(InvoiceStatus::Pending),
            "PAID" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

/// Append-only 1:1 derivative of a Paid or PendingPayment order. Once
/// `payment_status` is Paid the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub order_id: Uuid,
    pub subtotal_cents: i64,
    pub coupon_discount_cents: i64,
    pub membership_discount_cents: i64,
    pub shipping_fee_cents: i64,
    pub total_cents: i64,
    pub payment_status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn from_order(order: &Order, payment_status: InvoiceStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_number: invoice_number(order),
            order_id: order.id,
            subtotal_cents: order.subtotal_cents,
            coupon_discount_cents: order.coupon_discount_cents,
            membership_discount_cents: order.membership_discount_cents,
            shipping_fee_cents: order.shipping_fee_cents,
            total_cents: order.total_cents,
            payment_status,
            created_at: Utc::now(),
        }
    }

    /// Shipping fee as derivable from records persisted before the fee was
    /// tracked explicitly.
    pub fn derived_shipping_fee(&self) -> i64 {
        self.total_cents - self.subtotal_cents
            + self.coupon_discount_cents
            + self.membership_discount_cents
    }
}

fn invoice_number(order: &Order) -> String {
    // Deterministic per order: date of creation plus a stable id fragment.
    let id = order.id.simple().to_string();
    format!("PM-{}-{}", order.created_at.format("%Y%m%d"), &id[..8])
}

/// Audit record appended on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderChange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub change_type: String,
    pub from_status: Option<OrderStatus>,
    pub to_status: Option<OrderStatus>,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderChange {
    pub fn created(order_id: Uuid, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            change_type: "ORDER_CREATED".to_string(),
            from_status: None,
            to_status: Some(OrderStatus::Created),
            actor: actor.to_string(),
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn transition(
        order_id: Uuid,
        change_type: &str,
        from: OrderStatus,
        to: OrderStatus,
        actor: &str,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            change_type: change_type.to_string(),
            from_status: Some(from),
            to_status: Some(to),
            actor: actor.to_string(),
            note,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> PricingResult {
        PricingResult {
            subtotal_cents: 5_000,
            coupon_discount_cents: 500,
            membership_discount_cents: 450,
            shipping_fee_cents: 1_000,
            shipping_waiver: None,
            total_cents: 5_050,
        }
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            user_id: "u1".to_string(),
            name: "Sam".to_string(),
            email: Masked("sam@example.com".to_string()),
            shipping_address: "1 Bark Lane".to_string(),
        }
    }

    #[test]
    fn new_order_starts_created_with_frozen_totals() {
        let order = Order::new(
            customer(),
            vec![],
            &pricing(),
            Some("SAVE10".to_string()),
            None,
            None,
            PaymentMethod::Wallet,
        );
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.total_cents, 5_050);
        order.verify_total().unwrap();
    }

    #[test]
    fn verify_total_flags_tampered_records() {
        let mut order = Order::new(
            customer(),
            vec![],
            &pricing(),
            None,
            None,
            None,
            PaymentMethod::Wallet,
        );
        order.total_cents += 1;
        let err = order.verify_total().unwrap_err();
        assert!(matches!(err, CheckoutError::InconsistentState { .. }));
    }

    #[test]
    fn invoice_round_trips_shipping_fee() {
        let order = Order::new(
            customer(),
            vec![],
            &pricing(),
            None,
            None,
            None,
            PaymentMethod::Wallet,
        );
        let invoice = Invoice::from_order(&order, InvoiceStatus::Paid);
        assert_eq!(invoice.derived_shipping_fee(), order.shipping_fee_cents);
    }

    #[test]
    fn derived_shipping_fee_matches_the_live_evaluator() {
        // Records persisted before the fee column existed must reproduce the
        // fee the current engine computes for the same inputs.
        use pawmart_pricing::engine::{CartLine, PricingEngine};

        let engine = PricingEngine::default();
        let lines = [CartLine {
            product_id: Uuid::new_v4(),
            unit_price_cents: 4_050,
            quantity: 1,
        }];
        let computed = engine.price_cart(&lines, None, None, None, Utc::now());

        let order = Order::new(
            customer(),
            vec![],
            &computed,
            None,
            None,
            None,
            PaymentMethod::Wallet,
        );
        let invoice = Invoice::from_order(&order, InvoiceStatus::Paid);
        assert_eq!(invoice.derived_shipping_fee(), computed.shipping_fee_cents);
        assert_eq!(invoice.derived_shipping_fee(), 1_000);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::PendingPayment,
            OrderStatus::Paid,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        for method in [
            PaymentMethod::Wallet,
            PaymentMethod::CardGateway,
            PaymentMethod::AttestedTransfer,
            PaymentMethod::SelfAttestedQr,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
    }
}
