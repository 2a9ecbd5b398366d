use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pawmart_core::CheckoutError;
use pawmart_order::manager::OrderError;
use serde_json::json;

/// API-boundary error type. Business-rule failures become structured JSON
/// responses; only genuinely unexpected failures surface as 500s, with the
/// detail kept in the server log.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    InvalidCoupon(String),
    InsufficientFunds(String),
    Gateway(String),
    Network(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidCoupon(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InsufficientFunds(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Network(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(msg) => AppError::Validation(msg),
            CheckoutError::InvalidCoupon(msg) => AppError::InvalidCoupon(msg),
            CheckoutError::InsufficientFunds { .. } => AppError::InsufficientFunds(err.to_string()),
            CheckoutError::Gateway(msg) => AppError::Gateway(msg),
            CheckoutError::Network(msg) => AppError::Network(msg),
            CheckoutError::InconsistentState { .. } => AppError::Internal(err.to_string()),
            CheckoutError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
