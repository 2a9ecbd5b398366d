use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod checkout;
pub mod coupons;
pub mod error;
pub mod payments;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/v1/checkout", post(checkout::create_order))
        .route("/v1/coupons/validate", post(coupons::validate_coupon))
        .route("/v1/orders/{id}", get(checkout::get_order))
        .route("/v1/orders/{id}/pay/wallet", post(payments::pay_with_wallet))
        .route(
            "/v1/orders/{id}/payment-session",
            post(payments::create_payment_session),
        )
        .route(
            "/v1/orders/{id}/payment-status",
            get(payments::get_payment_status),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
