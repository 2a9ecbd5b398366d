use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub customer_id: String,
    pub total_cents: i64,
    pub payment_method: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementRecordedEvent {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub channel: String,
    pub event_type: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentClaimRecordedEvent {
    pub order_id: Uuid,
    pub reference: Option<String>,
    pub timestamp: i64,
}
