use crate::{CheckoutError, CheckoutResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Session status as reported by the external gateway. The gateway's
/// internal protocol is opaque beyond this enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

/// A payment session owned by the external gateway; this engine polls it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub gateway_ref: String,
    pub payment_url: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Contract with the external card gateway: create a session, look its
/// status up later. Transport failures surface as `CheckoutError::Network`
/// so the poller can retry; gateway-side rejections as
/// `CheckoutError::Gateway`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        customer_email: &str,
    ) -> CheckoutResult<PaymentSession>;

    async fn fetch_session(&self, gateway_ref: &str) -> CheckoutResult<PaymentSession>;
}

/// In-process gateway for tests and local development. Sessions start
/// Pending; tests drive them to a terminal status with `set_status`.
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, PaymentSession>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_status(&self, gateway_ref: &str, status: SessionStatus) {
        if let Some(session) = self.sessions.lock().await.get_mut(gateway_ref) {
            session.status = status;
        }
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(
        &self,
        order_id: Uuid,
        _amount_cents: i64,
        _customer_email: &str,
    ) -> CheckoutResult<PaymentSession> {
        let gateway_ref = format!("sess_{}", order_id.simple());
        let session = PaymentSession {
            gateway_ref: gateway_ref.clone(),
            payment_url: format!("https://pay.example.test/checkout/{}", gateway_ref),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
        };
        self.sessions
            .lock()
            .await
            .insert(gateway_ref, session.clone());
        Ok(session)
    }

    async fn fetch_session(&self, gateway_ref: &str) -> CheckoutResult<PaymentSession> {
        self.sessions
            .lock()
            .await
            .get(gateway_ref)
            .cloned()
            .ok_or_else(|| {
                CheckoutError::Gateway(format!("unknown payment session {}", gateway_ref))
            })
    }
}
