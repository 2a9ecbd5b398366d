use axum::{
    extract::{Path, State},
    Json,
};
use pawmart_order::models::PaymentMethod;
use pawmart_order::settlement::SettlementOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::InvoiceView;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WalletPayRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct WalletPayResponse {
    pub order_id: Uuid,
    pub status: String,
    pub invoice: InvoiceView,
}

#[derive(Debug, Serialize)]
pub struct PaymentSessionResponse {
    pub order_id: Uuid,
    pub payment_url: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub order_id: Uuid,
    pub status: String,
    pub awaiting_verification: bool,
}

/// POST /v1/orders/{id}/pay/wallet
/// Settle a previously created wallet order. The charged amount is the
/// stored pricing snapshot; the balance is re-read inside the settlement
/// step, immediately before the debit decision.
pub async fn pay_with_wallet(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<WalletPayRequest>,
) -> Result<Json<WalletPayResponse>, AppError> {
    // 1. Load the order; its snapshot is the only amount ever charged.
    let mut order = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

    // 2. The order must belong to the paying customer and the wallet channel.
    if order.customer.user_id != req.user_id {
        return Err(AppError::Validation(
            "order does not belong to this customer".to_string(),
        ));
    }
    if order.payment_method != PaymentMethod::Wallet {
        return Err(AppError::Validation(format!(
            "order {} is not payable by wallet",
            order_id
        )));
    }

    // 3. Settle inline.
    let outcome = state.dispatcher.settle(&mut order, None).await?;
    let SettlementOutcome::Paid { invoice } = outcome else {
        return Err(AppError::Internal(
            "wallet settlement returned a non-inline outcome".to_string(),
        ));
    };

    Ok(Json(WalletPayResponse {
        order_id,
        status: order.status.to_string(),
        invoice: InvoiceView::from_invoice(&invoice),
    }))
}

/// POST /v1/orders/{id}/payment-session
/// Open (or re-open after a gateway failure) the card session for an order.
/// Amount and customer details come from the stored order, never the caller.
pub async fn create_payment_session(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentSessionResponse>, AppError> {
    let mut order = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

    if order.payment_method != PaymentMethod::CardGateway {
        return Err(AppError::Validation(format!(
            "order {} is not payable by card gateway",
            order_id
        )));
    }

    let outcome = state.dispatcher.settle(&mut order, None).await?;
    let SettlementOutcome::RedirectToGateway {
        gateway_ref,
        payment_url,
    } = outcome
    else {
        return Err(AppError::Internal(
            "gateway settlement returned a non-redirect outcome".to_string(),
        ));
    };

    let handle = state.poller.watch(order.id, gateway_ref);
    state.track_watcher(order.id, handle).await;

    Ok(Json(PaymentSessionResponse {
        order_id,
        payment_url,
    }))
}

/// GET /v1/orders/{id}/payment-status
/// Polled by the storefront while a session or manual verification is
/// outstanding.
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let order = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

    Ok(Json(PaymentStatusResponse {
        order_id,
        status: order.status.to_string(),
        awaiting_verification: order.awaiting_verification(),
    }))
}
