use pawmart_core::coupons::CouponSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why shipping was waived. The customer-facing reason depends on which rule
/// fired, so evaluation stops at the first match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaiverReason {
    FreeDeliveryVoucher,
    FreeDeliveryCoupon,
    OrderOverThreshold,
    ActiveMembership,
}

impl WaiverReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaiverReason::FreeDeliveryVoucher => "FREE_DELIVERY_VOUCHER",
            WaiverReason::FreeDeliveryCoupon => "FREE_DELIVERY_COUPON",
            WaiverReason::OrderOverThreshold => "ORDER_OVER_THRESHOLD",
            WaiverReason::ActiveMembership => "ACTIVE_MEMBERSHIP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE_DELIVERY_VOUCHER" => Some(WaiverReason::FreeDeliveryVoucher),
            "FREE_DELIVERY_COUPON" => Some(WaiverReason::FreeDeliveryCoupon),
            "ORDER_OVER_THRESHOLD" => Some(WaiverReason::OrderOverThreshold),
            "ACTIVE_MEMBERSHIP" => Some(WaiverReason::ActiveMembership),
            _ => None,
        }
    }

    /// Customer-facing waiver text.
    pub fn message(&self) -> &'static str {
        match self {
            WaiverReason::FreeDeliveryVoucher => "free delivery voucher applied",
            WaiverReason::FreeDeliveryCoupon => "free delivery coupon applied",
            WaiverReason::OrderOverThreshold => "order over threshold",
            WaiverReason::ActiveMembership => "member free shipping",
        }
    }
}

impl fmt::Display for WaiverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Shipping fee rules. Waivers are evaluated in a fixed precedence; the
/// first matching rule sets the fee to zero and reports its reason, and the
/// remaining rules are not consulted even if they would also match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingRules {
    pub base_fee_cents: i64,
    /// Cart totals at or above this waive shipping (rule 3).
    pub free_threshold_cents: i64,
    /// Recognized free-delivery voucher codes start with this prefix.
    pub voucher_prefix: String,
}

impl ShippingRules {
    /// Evaluate the waiver rules for one cart.
    ///
    /// Precedence: explicit voucher code, FreeDelivery coupon, cart total
    /// over threshold (independent of discounts already applied), then any
    /// active membership tier.
    pub fn evaluate(
        &self,
        cart_total_cents: i64,
        coupon: Option<&CouponSpec>,
        has_active_membership: bool,
        free_delivery_code: Option<&str>,
    ) -> (i64, Option<WaiverReason>) {
        if let Some(code) = free_delivery_code {
            if self.recognizes_voucher(code) {
                return (0, Some(WaiverReason::FreeDeliveryVoucher));
            }
        }

        if coupon.map(|c| c.is_free_delivery()).unwrap_or(false) {
            return (0, Some(WaiverReason::FreeDeliveryCoupon));
        }

        if cart_total_cents >= self.free_threshold_cents {
            return (0, Some(WaiverReason::OrderOverThreshold));
        }

        if has_active_membership {
            return (0, Some(WaiverReason::ActiveMembership));
        }

        (self.base_fee_cents, None)
    }

    fn recognizes_voucher(&self, code: &str) -> bool {
        !code.is_empty() && code.starts_with(&self.voucher_prefix)
    }
}

impl Default for ShippingRules {
    fn default() -> Self {
        Self {
            base_fee_cents: 1000,
            free_threshold_cents: 10_000,
            voucher_prefix: "FREESHIP-".to_string(),
        }
    }
}
