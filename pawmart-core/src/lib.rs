pub mod coupons;
pub mod gateway;
pub mod membership;
pub mod wallet;

use uuid::Uuid;

/// Engine-wide error taxonomy. Every business-rule failure a caller can act
/// on gets its own variant so the API layer can map it without string
/// matching.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    /// Guarantees that no debit occurred.
    #[error("Insufficient wallet funds: balance {balance_cents} < total {total_cents}")]
    InsufficientFunds {
        balance_cents: i64,
        total_cents: i64,
    },

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Network error: {0}")]
    Network(String),

    /// A persisted record failed its own total-reconciliation invariant.
    /// Never silently corrected; the stored numbers are what was charged.
    #[error("Order {order_id} is inconsistent: stored total {stored_cents}, recomputed {derived_cents}")]
    InconsistentState {
        order_id: Uuid,
        stored_cents: i64,
        derived_cents: i64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;
