use crate::shipping::{ShippingRules, WaiverReason};
use chrono::{DateTime, Utc};
use pawmart_core::coupons::{CouponKind, CouponSpec};
use pawmart_core::membership::MembershipTier;
use pawmart_shared::money::{apply_rate, line_total};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of the cart snapshot handed in by the caller. Read-only input;
/// the engine never mutates the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

/// The deterministic breakdown of one checkout. Immutable once computed and
/// the only legitimate source for the amount ever charged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingResult {
    pub subtotal_cents: i64,
    pub coupon_discount_cents: i64,
    pub membership_discount_cents: i64,
    pub shipping_fee_cents: i64,
    pub shipping_waiver: Option<WaiverReason>,
    pub total_cents: i64,
}

impl PricingResult {
    /// The invariant every persisted order and invoice must satisfy.
    pub fn recompute_total(&self) -> i64 {
        (self.subtotal_cents - self.coupon_discount_cents - self.membership_discount_cents)
            .max(0)
            + self.shipping_fee_cents
    }
}

/// Composes subtotal, coupon, membership and shipping into a final
/// chargeable total. Pure computation over already-validated inputs; invalid
/// coupons are rejected upstream by the DiscountValidator.
pub struct PricingEngine {
    shipping: ShippingRules,
}

impl PricingEngine {
    pub fn new(shipping: ShippingRules) -> Self {
        Self { shipping }
    }

    /// Sum of unit price times quantity, no rounding beyond the minor unit.
    pub fn subtotal(&self, lines: &[CartLine]) -> i64 {
        lines
            .iter()
            .map(|l| line_total(l.unit_price_cents, l.quantity))
            .sum()
    }

    /// Monetary coupon discount. Fixed amounts are capped at the subtotal so
    /// the post-coupon amount never goes negative; FreeDelivery coupons have
    /// no monetary effect here and are consumed by the shipping rules.
    pub fn coupon_discount(&self, subtotal_cents: i64, coupon: Option<&CouponSpec>) -> i64 {
        match coupon.map(|c| &c.kind) {
            Some(CouponKind::Fixed { amount_cents }) => (*amount_cents).min(subtotal_cents),
            Some(CouponKind::Percentage { rate }) => apply_rate(subtotal_cents, *rate),
            Some(CouponKind::FreeDelivery) | None => 0,
        }
    }

    /// Membership discount on the post-coupon amount. Computing this on the
    /// raw subtotal instead would change what customers were charged, so the
    /// post-coupon base is a contract, not an implementation detail.
    pub fn membership_discount(
        &self,
        post_coupon_cents: i64,
        tier: Option<&MembershipTier>,
        now: DateTime<Utc>,
    ) -> i64 {
        match tier {
            Some(t) if t.is_active(now) => apply_rate(post_coupon_cents, t.rate),
            _ => 0,
        }
    }

    pub fn final_total(
        &self,
        subtotal_cents: i64,
        coupon_discount_cents: i64,
        membership_discount_cents: i64,
        shipping_fee_cents: i64,
    ) -> i64 {
        (subtotal_cents - coupon_discount_cents - membership_discount_cents).max(0)
            + shipping_fee_cents
    }

    /// Full pricing pass for one checkout request.
    pub fn price_cart(
        &self,
        lines: &[CartLine],
        coupon: Option<&CouponSpec>,
        tier: Option<&MembershipTier>,
        free_delivery_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> PricingResult {
        let subtotal_cents = self.subtotal(lines);
        let coupon_discount_cents = self.coupon_discount(subtotal_cents, coupon);
        let post_coupon = subtotal_cents - coupon_discount_cents;
        let membership_discount_cents = self.membership_discount(post_coupon, tier, now);

        let has_active_membership = tier.map(|t| t.is_active(now)).unwrap_or(false);
        // The threshold rule looks at the undiscounted cart total.
        let (shipping_fee_cents, shipping_waiver) = self.shipping.evaluate(
            subtotal_cents,
            coupon,
            has_active_membership,
            free_delivery_code,
        );

        let total_cents = self.final_total(
            subtotal_cents,
            coupon_discount_cents,
            membership_discount_cents,
            shipping_fee_cents,
        );

        PricingResult {
            subtotal_cents,
            coupon_discount_cents,
            membership_discount_cents,
            shipping_fee_cents,
            shipping_waiver,
            total_cents,
        }
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(ShippingRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pawmart_core::membership::TierName;

    fn lines(prices: &[(i64, u32)]) -> Vec<CartLine> {
        prices
            .iter()
            .map(|&(unit_price_cents, quantity)| CartLine {
                product_id: Uuid::new_v4(),
                unit_price_cents,
                quantity,
            })
            .collect()
    }

    fn golden_tier() -> MembershipTier {
        MembershipTier {
            tier: TierName::Golden,
            rate: 0.10,
            expires_at: Utc::now() + Duration::days(30),
        }
    }

    fn percent_coupon(rate: f64) -> CouponSpec {
        CouponSpec {
            code: "PCT".to_string(),
            kind: CouponKind::Percentage { rate },
            min_order_cents: None,
        }
    }

    #[test]
    fn scenario_a_threshold_waiver() {
        // subtotal 150.00, no coupon, no membership, threshold 100.00
        let engine = PricingEngine::default();
        let result = engine.price_cart(&lines(&[(15_000, 1)]), None, None, None, Utc::now());

        assert_eq!(result.subtotal_cents, 15_000);
        assert_eq!(result.shipping_fee_cents, 0);
        assert_eq!(result.shipping_waiver, Some(WaiverReason::OrderOverThreshold));
        assert_eq!(result.total_cents, 15_000);
    }

    #[test]
    fn scenario_b_stacked_discounts() {
        // subtotal 50.00, 10% coupon, active Golden tier at 10%:
        // post-coupon 45.00, membership 4.50, pre-shipping 40.50,
        // base fee 10.00 with no waiver met => total 50.50
        let engine = PricingEngine::default();
        let coupon = percent_coupon(0.10);
        let tier = golden_tier();
        let result = engine.price_cart(
            &lines(&[(5_000, 1)]),
            Some(&coupon),
            Some(&tier),
            None,
            Utc::now(),
        );

        assert_eq!(result.subtotal_cents, 5_000);
        assert_eq!(result.coupon_discount_cents, 500);
        assert_eq!(result.membership_discount_cents, 450);
        assert_eq!(result.shipping_fee_cents, 0); // membership waives shipping
        assert_eq!(result.shipping_waiver, Some(WaiverReason::ActiveMembership));
        assert_eq!(result.total_cents, 4_050);
    }

    #[test]
    fn scenario_b_with_base_fee() {
        // Same discount stack, base fee 10.00 charged: 40.50 + 10.00 = 50.50
        let engine = PricingEngine::default();
        let coupon = percent_coupon(0.10);
        let subtotal = engine.subtotal(&lines(&[(5_000, 1)]));
        let coupon_discount = engine.coupon_discount(subtotal, Some(&coupon));
        let membership_discount = 450; // as computed on the post-coupon amount
        let total = engine.final_total(subtotal, coupon_discount, membership_discount, 1_000);
        assert_eq!(total, 5_050);
    }

    #[test]
    fn membership_applies_to_post_coupon_amount() {
        let engine = PricingEngine::default();
        let tier = golden_tier();
        let coupon = percent_coupon(0.10);
        let now = Utc::now();

        let with_coupon = engine.price_cart(
            &lines(&[(5_000, 1)]),
            Some(&coupon),
            Some(&tier),
            None,
            now,
        );
        let without_coupon =
            engine.price_cart(&lines(&[(5_000, 1)]), None, Some(&tier), None, now);

        // 10% of 45.00 vs 10% of 50.00
        assert_eq!(with_coupon.membership_discount_cents, 450);
        assert_eq!(without_coupon.membership_discount_cents, 500);
    }

    #[test]
    fn fixed_coupon_is_capped_at_subtotal() {
        let engine = PricingEngine::default();
        let coupon = CouponSpec {
            code: "BIG50".to_string(),
            kind: CouponKind::Fixed { amount_cents: 9_999 },
            min_order_cents: None,
        };
        let result = engine.price_cart(&lines(&[(2_000, 1)]), Some(&coupon), None, None, Utc::now());

        assert_eq!(result.coupon_discount_cents, 2_000);
        assert!(result.coupon_discount_cents <= result.subtotal_cents);
        // Nothing left but the shipping fee
        assert_eq!(result.total_cents, 1_000);
        assert!(result.total_cents >= 0);
    }

    #[test]
    fn expired_tier_earns_no_discount() {
        let engine = PricingEngine::default();
        let tier = MembershipTier {
            tier: TierName::Diamond,
            rate: 0.15,
            expires_at: Utc::now() - Duration::days(1),
        };
        let result = engine.price_cart(&lines(&[(5_000, 1)]), None, Some(&tier), None, Utc::now());

        assert_eq!(result.membership_discount_cents, 0);
        assert_eq!(result.shipping_fee_cents, 1_000);
        assert_eq!(result.shipping_waiver, None);
    }

    #[test]
    fn free_delivery_coupon_leaves_subtotal_untouched() {
        let engine = PricingEngine::default();
        let coupon = CouponSpec {
            code: "SHIPFREE".to_string(),
            kind: CouponKind::FreeDelivery,
            min_order_cents: None,
        };
        let result = engine.price_cart(&lines(&[(5_000, 1)]), Some(&coupon), None, None, Utc::now());

        assert_eq!(result.coupon_discount_cents, 0);
        assert_eq!(result.shipping_fee_cents, 0);
        assert_eq!(result.shipping_waiver, Some(WaiverReason::FreeDeliveryCoupon));
        assert_eq!(result.total_cents, 5_000);
    }

    #[test]
    fn result_invariant_holds_across_combinations() {
        let engine = PricingEngine::default();
        let now = Utc::now();
        let tier = golden_tier();
        let coupons = [
            None,
            Some(percent_coupon(0.10)),
            Some(CouponSpec {
                code: "FIX".to_string(),
                kind: CouponKind::Fixed { amount_cents: 700 },
                min_order_cents: None,
            }),
            Some(CouponSpec {
                code: "SHIPFREE".to_string(),
                kind: CouponKind::FreeDelivery,
                min_order_cents: None,
            }),
        ];

        for coupon in &coupons {
            for tier in [None, Some(&tier)] {
                for code in [None, Some("FREESHIP-X")] {
                    let result = engine.price_cart(
                        &lines(&[(3_199, 2), (499, 1)]),
                        coupon.as_ref(),
                        tier,
                        code,
                        now,
                    );
                    assert_eq!(result.total_cents, result.recompute_total());
                    assert!(result.total_cents >= 0);
                    assert!(result.coupon_discount_cents <= result.subtotal_cents);
                }
            }
        }
    }
}
