use pawmart_core::coupons::{CouponDirectory, CouponSpec};
use pawmart_core::{CheckoutError, CheckoutResult};
use pawmart_shared::money::format_cents;
use std::sync::Arc;

/// Validates a coupon code against an order amount via the remote directory.
/// Stateless and side-effect-free on failure, so a rejected code is safe to
/// retry with a different one. Lookups happen per request and are never
/// cached.
pub struct DiscountValidator {
    directory: Arc<dyn CouponDirectory>,
}

impl DiscountValidator {
    pub fn new(directory: Arc<dyn CouponDirectory>) -> Self {
        Self { directory }
    }

    pub async fn validate(&self, code: &str, order_amount_cents: i64) -> CheckoutResult<CouponSpec> {
        if code.trim().is_empty() {
            return Err(CheckoutError::Validation("coupon code is empty".to_string()));
        }

        let spec = self
            .directory
            .lookup(code)
            .await?
            .ok_or_else(|| CheckoutError::InvalidCoupon(format!("unknown code {}", code)))?;

        if let Some(min) = spec.min_order_cents {
            if order_amount_cents < min {
                return Err(CheckoutError::InvalidCoupon(format!(
                    "code {} requires a minimum order of {}",
                    code,
                    format_cents(min)
                )));
            }
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawmart_core::coupons::{CouponKind, MockCouponDirectory};

    async fn validator_with(spec: CouponSpec) -> DiscountValidator {
        let directory = MockCouponDirectory::new();
        directory.insert(spec).await;
        DiscountValidator::new(Arc::new(directory))
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let validator = DiscountValidator::new(Arc::new(MockCouponDirectory::new()));
        let err = validator.validate("NOPE", 5_000).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCoupon(_)));
    }

    #[tokio::test]
    async fn minimum_amount_is_enforced() {
        let validator = validator_with(CouponSpec {
            code: "SAVE5".to_string(),
            kind: CouponKind::Fixed { amount_cents: 500 },
            min_order_cents: Some(2_500),
        })
        .await;

        let err = validator.validate("SAVE5", 2_000).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCoupon(_)));

        // Retrying with a qualifying amount succeeds; the earlier failure
        // left nothing behind.
        let spec = validator.validate("SAVE5", 2_500).await.unwrap();
        assert_eq!(spec.code, "SAVE5");
    }
}
