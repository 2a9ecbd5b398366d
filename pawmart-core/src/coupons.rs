use crate::CheckoutResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Discount instrument kinds. FreeDelivery carries no monetary payload; it
/// waives shipping through the rule evaluator instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponKind {
    Fixed { amount_cents: i64 },
    Percentage { rate: f64 },
    FreeDelivery,
}

/// A coupon as returned by the remote directory. Looked up per request and
/// never cached across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSpec {
    pub code: String,
    #[serde(flatten)]
    pub kind: CouponKind,
    /// Minimum order amount the coupon requires, if any.
    pub min_order_cents: Option<i64>,
}

impl CouponSpec {
    pub fn is_free_delivery(&self) -> bool {
        matches!(self.kind, CouponKind::FreeDelivery)
    }
}

/// Contract with the remote coupon directory. `lookup` returns None for an
/// unknown or expired code; business-rule checks (minimum amount) happen in
/// the DiscountValidator on top of this.
#[async_trait]
pub trait CouponDirectory: Send + Sync {
    async fn lookup(&self, code: &str) -> CheckoutResult<Option<CouponSpec>>;
}

/// In-process directory for tests and local development.
pub struct MockCouponDirectory {
    coupons: Mutex<HashMap<String, CouponSpec>>,
}

impl MockCouponDirectory {
    pub fn new() -> Self {
        Self {
            coupons: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, spec: CouponSpec) {
        self.coupons.lock().await.insert(spec.code.clone(), spec);
    }
}

impl Default for MockCouponDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CouponDirectory for MockCouponDirectory {
    async fn lookup(&self, code: &str) -> CheckoutResult<Option<CouponSpec>> {
        Ok(self.coupons.lock().await.get(code).cloned())
    }
}
