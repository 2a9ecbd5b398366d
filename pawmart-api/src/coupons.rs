use axum::{extract::State, Json};
use pawmart_core::coupons::CouponSpec;
use pawmart_core::CheckoutError;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /v1/coupons/validate
/// Pre-checkout coupon check. A rejected code is an ordinary answer here,
/// not an error response; the customer just tries another one.
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>, AppError> {
    match state
        .validator
        .validate(&req.code, req.order_amount_cents)
        .await
    {
        Ok(spec) => Ok(Json(ValidateCouponResponse {
            valid: true,
            coupon: Some(spec),
            message: None,
        })),
        Err(CheckoutError::InvalidCoupon(msg)) | Err(CheckoutError::Validation(msg)) => {
            Ok(Json(ValidateCouponResponse {
                valid: false,
                coupon: None,
                message: Some(msg),
            }))
        }
        Err(err) => Err(err.into()),
    }
}
