use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use pawmart_core::CheckoutError;
use pawmart_order::models::{CustomerInfo, Invoice, Order, OrderLine, PaymentMethod};
use pawmart_order::settlement::{SettlementOutcome, TransferAttestation};
use pawmart_pricing::engine::CartLine;
use pawmart_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartItemPayload>,
    pub customer: CustomerPayload,
    pub discount_code: Option<String>,
    pub free_delivery_code: Option<String>,
    pub payment_method: PaymentMethod,
    /// Required for the attested-transfer channel, ignored elsewhere.
    pub transfer_reference: Option<String>,
    pub transfer_account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CartItemPayload {
    pub product_id: Uuid,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CustomerPayload {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub shipping_address: String,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub status: String,
    pub payment_method: String,
    pub subtotal_cents: i64,
    pub coupon_discount_cents: i64,
    pub discount_code: Option<String>,
    pub membership_discount_cents: i64,
    pub membership_tier: Option<String>,
    pub shipping_fee_cents: i64,
    pub shipping_waiver: Option<String>,
    pub shipping_waiver_message: Option<String>,
    pub free_delivery_code: Option<String>,
    pub total_cents: i64,
    pub awaiting_verification: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl OrderView {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status.to_string(),
            payment_method: order.payment_method.to_string(),
            subtotal_cents: order.subtotal_cents,
            coupon_discount_cents: order.coupon_discount_cents,
            discount_code: order.discount_code.clone(),
            membership_discount_cents: order.membership_discount_cents,
            membership_tier: order.membership_tier.map(|t| t.as_str().to_string()),
            shipping_fee_cents: order.shipping_fee_cents,
            shipping_waiver: order.shipping_waiver.map(|w| w.as_str().to_string()),
            shipping_waiver_message: order.shipping_waiver.map(|w| w.message().to_string()),
            free_delivery_code: order.free_delivery_code.clone(),
            total_cents: order.total_cents,
            awaiting_verification: order.awaiting_verification(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub invoice_number: String,
    pub order_id: Uuid,
    pub subtotal_cents: i64,
    pub coupon_discount_cents: i64,
    pub membership_discount_cents: i64,
    pub shipping_fee_cents: i64,
    pub total_cents: i64,
    pub payment_status: String,
}

impl InvoiceView {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            invoice_number: invoice.invoice_number.clone(),
            order_id: invoice.order_id,
            subtotal_cents: invoice.subtotal_cents,
            coupon_discount_cents: invoice.coupon_discount_cents,
            membership_discount_cents: invoice.membership_discount_cents,
            shipping_fee_cents: invoice.shipping_fee_cents,
            total_cents: invoice.total_cents,
            payment_status: invoice.payment_status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: OrderView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    pub awaiting_verification: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/checkout
/// Price the cart, persist the order, and attempt settlement on the chosen
/// channel. The charge amount is always re-derived server-side; nothing the
/// client claims about totals is trusted.
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    // 1. Validate the request shape. Nothing below runs until this passes,
    //    so rejection has no side effects.
    if req.items.is_empty() {
        return Err(AppError::Validation("cart is empty".to_string()));
    }
    for item in &req.items {
        if item.quantity == 0 {
            return Err(AppError::Validation("item quantity must be positive".to_string()));
        }
        if item.unit_price_cents < 0 {
            return Err(AppError::Validation("item price cannot be negative".to_string()));
        }
    }
    if req.customer.user_id.trim().is_empty() {
        return Err(AppError::Validation("customer user_id is required".to_string()));
    }
    if req.customer.email.trim().is_empty() {
        return Err(AppError::Validation("customer email is required".to_string()));
    }
    if req.customer.shipping_address.trim().is_empty() {
        return Err(AppError::Validation("shipping address is required".to_string()));
    }

    let now = Utc::now();
    let lines: Vec<CartLine> = req
        .items
        .iter()
        .map(|i| CartLine {
            product_id: i.product_id,
            unit_price_cents: i.unit_price_cents,
            quantity: i.quantity,
        })
        .collect();

    // 2. Resolve the customer's membership tier.
    let tier = state.membership.tier_for(&req.customer.user_id).await?;

    // 3. Validate the coupon against the server-computed cart total.
    let subtotal = state.pricing.subtotal(&lines);
    let coupon = match &req.discount_code {
        Some(code) => Some(state.validator.validate(code, subtotal).await?),
        None => None,
    };

    // 4. Deterministic pricing pass.
    let pricing = state.pricing.price_cart(
        &lines,
        coupon.as_ref(),
        tier.as_ref(),
        req.free_delivery_code.as_deref(),
        now,
    );

    // 5. Persist the order and dispatch settlement on its channel.
    let order = Order::new(
        CustomerInfo {
            user_id: req.customer.user_id.clone(),
            name: req.customer.name.clone(),
            email: Masked(req.customer.email.clone()),
            shipping_address: req.customer.shipping_address.clone(),
        },
        req.items
            .iter()
            .map(|i| OrderLine {
                product_id: i.product_id,
                unit_price_cents: i.unit_price_cents,
                quantity: i.quantity,
            })
            .collect(),
        &pricing,
        req.discount_code.clone(),
        tier.as_ref().filter(|t| t.is_active(now)).map(|t| t.tier),
        req.free_delivery_code.clone(),
        req.payment_method,
    );
    let order_id = order.id;

    let attestation = if req.transfer_reference.is_some() || req.transfer_account.is_some() {
        Some(TransferAttestation {
            reference: req.transfer_reference.clone().unwrap_or_default(),
            account: req.transfer_account.clone().unwrap_or_default(),
        })
    } else {
        None
    };

    let (order, outcome) = match state.dispatcher.place(order, attestation).await {
        Ok(placed) => placed,
        Err(CheckoutError::InsufficientFunds {
            balance_cents,
            total_cents,
        }) => {
            // The order survived as Created; the customer can top up and
            // retry through the wallet payment endpoint.
            let body = Json(json!({
                "error": CheckoutError::InsufficientFunds {
                    balance_cents,
                    total_cents,
                }
                .to_string(),
                "order_id": order_id,
            }));
            return Ok((StatusCode::PAYMENT_REQUIRED, body).into_response());
        }
        Err(err) => return Err(err.into()),
    };

    // 6. A gateway order gets a server-side session watcher alongside
    //    whatever polling the caller does.
    if let SettlementOutcome::RedirectToGateway { gateway_ref, .. } = &outcome {
        let handle = state.poller.watch(order.id, gateway_ref.clone());
        state.track_watcher(order.id, handle).await;
    }

    let (invoice, payment_url, awaiting_verification) = match outcome {
        SettlementOutcome::Paid { invoice } => (Some(InvoiceView::from_invoice(&invoice)), None, false),
        SettlementOutcome::RedirectToGateway { payment_url, .. } => (None, Some(payment_url), false),
        SettlementOutcome::AwaitingVerification => (None, None, true),
    };

    let response = CheckoutResponse {
        order: OrderView::from_order(&order),
        invoice,
        payment_url,
        awaiting_verification,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// GET /v1/orders/{id}
/// Order lookup for confirmation pages.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

    Ok(Json(OrderView::from_order(&order)))
}
