use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pawmart_core::membership::TierName;
use pawmart_core::{CheckoutError, CheckoutResult};
use pawmart_order::models::{
    CustomerInfo, Invoice, InvoiceStatus, ManualClaim, Order, OrderChange, OrderLine, OrderStatus,
    PaymentMethod,
};
use pawmart_order::repository::OrderLedger;
use pawmart_pricing::shipping::WaiverReason;
use pawmart_shared::pii::Masked;
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed OrderLedger. Row structs keep the queries type-safe; the
/// runtime query API is used so the crate builds without a live database.
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(err: sqlx::Error) -> CheckoutError {
    CheckoutError::Internal(format!("database error: {}", err))
}

fn bad_row(column: &str, value: &str) -> CheckoutError {
    CheckoutError::Internal(format!("unrecognized {} value: {}", column, value))
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    customer_name: String,
    customer_email: String,
    shipping_address: String,
    subtotal_cents: i64,
    coupon_discount_cents: i64,
    discount_code: Option<String>,
    membership_discount_cents: i64,
    membership_tier: Option<String>,
    shipping_fee_cents: i64,
    shipping_waiver: Option<String>,
    free_delivery_code: Option<String>,
    total_cents: i64,
    payment_method: String,
    status: String,
    claim_reference: Option<String>,
    claim_account: Option<String>,
    claim_attested_at: Option<DateTime<Utc>>,
    gateway_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    product_id: Uuid,
    unit_price_cents: i64,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    order_id: Uuid,
    subtotal_cents: i64,
    coupon_discount_cents: i64,
    membership_discount_cents: i64,
    shipping_fee_cents: i64,
    total_cents: i64,
    payment_status: String,
    created_at: DateTime<Utc>,
}

fn assemble_order(row: OrderRow, lines: Vec<OrderLineRow>) -> CheckoutResult<Order> {
    let status =
        OrderStatus::parse(&row.status).ok_or_else(|| bad_row("status", &row.status))?;
    let payment_method = PaymentMethod::parse(&row.payment_method)
        .ok_or_else(|| bad_row("payment_method", &row.payment_method))?;
    let membership_tier = match &row.membership_tier {
        Some(t) => Some(TierName::parse(t).ok_or_else(|| bad_row("membership_tier", t))?),
        None => None,
    };
    let shipping_waiver = match &row.shipping_waiver {
        Some(w) => Some(WaiverReason::parse(w).ok_or_else(|| bad_row("shipping_waiver", w))?),
        None => None,
    };
    let manual_claim = row.claim_attested_at.map(|attested_at| ManualClaim {
        reference: row.claim_reference.clone(),
        account: row.claim_account.clone(),
        attested_at,
    });

    let order = Order {
        id: row.id,
        customer: CustomerInfo {
            user_id: row.user_id,
            name: row.customer_name,
            email: Masked(row.customer_email),
            shipping_address: row.shipping_address,
        },
        lines: lines
            .into_iter()
            .map(|l| OrderLine {
                product_id: l.product_id,
                unit_price_cents: l.unit_price_cents,
                quantity: l.quantity as u32,
            })
            .collect(),
        subtotal_cents: row.subtotal_cents,
        coupon_discount_cents: row.coupon_discount_cents,
        discount_code: row.discount_code,
        membership_discount_cents: row.membership_discount_cents,
        membership_tier,
        shipping_fee_cents: row.shipping_fee_cents,
        shipping_waiver,
        free_delivery_code: row.free_delivery_code,
        total_cents: row.total_cents,
        payment_method,
        status,
        manual_claim,
        gateway_ref: row.gateway_ref,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };

    if let Err(err) = order.verify_total() {
        tracing::error!(order_id = %order.id, %err, "stored order fails its total invariant");
        return Err(err);
    }
    Ok(order)
}

fn assemble_invoice(row: InvoiceRow) -> CheckoutResult<Invoice> {
    let payment_status = InvoiceStatus::parse(&row.payment_status)
        .ok_or_else(|| bad_row("payment_status", &row.payment_status))?;
    Ok(Invoice {
        id: row.id,
        invoice_number: row.invoice_number,
        order_id: row.order_id,
        subtotal_cents: row.subtotal_cents,
        coupon_discount_cents: row.coupon_discount_cents,
        membership_discount_cents: row.membership_discount_cents,
        shipping_fee_cents: row.shipping_fee_cents,
        total_cents: row.total_cents,
        payment_status,
        created_at: row.created_at,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, customer_name, customer_email, shipping_address, \
     subtotal_cents, coupon_discount_cents, discount_code, membership_discount_cents, \
     membership_tier, shipping_fee_cents, shipping_waiver, free_delivery_code, total_cents, \
     payment_method, status, claim_reference, claim_account, claim_attested_at, gateway_ref, \
     created_at, updated_at";

impl PgOrderLedger {
    async fn load_lines(&self, order_id: Uuid) -> CheckoutResult<Vec<OrderLineRow>> {
        sqlx::query_as::<_, OrderLineRow>(
            "SELECT product_id, unit_price_cents, quantity FROM order_lines \
             WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn load_orders(&self, rows: Vec<OrderRow>) -> CheckoutResult<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.load_lines(row.id).await?;
            orders.push(assemble_order(row, lines)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn create_order(&self, order: &Order) -> CheckoutResult<()> {
        order.verify_total()?;
        let claim = order.manual_claim.as_ref();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, customer_name, customer_email, shipping_address, \
             subtotal_cents, coupon_discount_cents, discount_code, membership_discount_cents, \
             membership_tier, shipping_fee_cents, shipping_waiver, free_delivery_code, \
             total_cents, payment_method, status, claim_reference, claim_account, \
             claim_attested_at, gateway_ref, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22)",
        )
        .bind(order.id)
        .bind(&order.customer.user_id)
        .bind(&order.customer.name)
        .bind(order.customer.email.inner())
        .bind(&order.customer.shipping_address)
        .bind(order.subtotal_cents)
        .bind(order.coupon_discount_cents)
        .bind(&order.discount_code)
        .bind(order.membership_discount_cents)
        .bind(order.membership_tier.map(|t| t.as_str()))
        .bind(order.shipping_fee_cents)
        .bind(order.shipping_waiver.map(|w| w.as_str()))
        .bind(&order.free_delivery_code)
        .bind(order.total_cents)
        .bind(order.payment_method.as_str())
        .bind(order.status.as_str())
        .bind(claim.and_then(|c| c.reference.clone()))
        .bind(claim.and_then(|c| c.account.clone()))
        .bind(claim.map(|c| c.attested_at))
        .bind(&order.gateway_ref)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for line in &order.lines {
            sqlx::query(
                "INSERT INTO order_lines (id, order_id, product_id, unit_price_cents, quantity) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(line.product_id)
            .bind(line.unit_price_cents)
            .bind(line.quantity as i32)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn get_order(&self, id: Uuid) -> CheckoutResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let lines = self.load_lines(row.id).await?;
                Ok(Some(assemble_order(row, lines)?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> CheckoutResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CheckoutError::Internal(format!("order {} not found", id)));
        }
        Ok(())
    }

    async fn record_manual_claim(&self, id: Uuid, claim: &ManualClaim) -> CheckoutResult<()> {
        sqlx::query(
            "UPDATE orders SET claim_reference = $1, claim_account = $2, claim_attested_at = $3, \
             updated_at = NOW() WHERE id = $4",
        )
        .bind(&claim.reference)
        .bind(&claim.account)
        .bind(claim.attested_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_gateway_ref(&self, id: Uuid, gateway_ref: &str) -> CheckoutResult<()> {
        sqlx::query("UPDATE orders SET gateway_ref = $1, updated_at = NOW() WHERE id = $2")
            .bind(gateway_ref)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn add_order_change(&self, change: &OrderChange) -> CheckoutResult<()> {
        sqlx::query(
            "INSERT INTO order_changes (id, order_id, change_type, from_status, to_status, \
             actor, note, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(change.id)
        .bind(change.order_id)
        .bind(&change.change_type)
        .bind(change.from_status.map(|s| s.as_str()))
        .bind(change.to_status.map(|s| s.as_str()))
        .bind(&change.actor)
        .bind(&change.note)
        .bind(change.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CheckoutResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = $1 AND updated_at < $2 ORDER BY updated_at",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.load_orders(rows).await
    }

    async fn list_paid_missing_invoice(&self) -> CheckoutResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders o WHERE o.status = $1 \
             AND NOT EXISTS (SELECT 1 FROM invoices i WHERE i.order_id = o.id) \
             ORDER BY o.updated_at",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::Paid.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.load_orders(rows).await
    }

    async fn list_awaiting_verification(&self) -> CheckoutResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = $1 AND claim_attested_at IS NOT NULL \
             ORDER BY updated_at",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::PendingPayment.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.load_orders(rows).await
    }

    async fn create_invoice(&self, invoice: &Invoice) -> CheckoutResult<Invoice> {
        // One invoice per order: the unique constraint on order_id makes the
        // insert a no-op on replay, and the stored record is returned.
        sqlx::query(
            "INSERT INTO invoices (id, invoice_number, order_id, subtotal_cents, \
             coupon_discount_cents, membership_discount_cents, shipping_fee_cents, total_cents, \
             payment_status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.order_id)
        .bind(invoice.subtotal_cents)
        .bind(invoice.coupon_discount_cents)
        .bind(invoice.membership_discount_cents)
        .bind(invoice.shipping_fee_cents)
        .bind(invoice.total_cents)
        .bind(invoice.payment_status.as_str())
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.invoice_for_order(invoice.order_id)
            .await?
            .ok_or_else(|| {
                CheckoutError::Internal(format!(
                    "invoice for order {} missing after insert",
                    invoice.order_id
                ))
            })
    }

    async fn invoice_for_order(&self, order_id: Uuid) -> CheckoutResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, invoice_number, order_id, subtotal_cents, coupon_discount_cents, \
             membership_discount_cents, shipping_fee_cents, total_cents, payment_status, \
             created_at FROM invoices WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(assemble_invoice).transpose()
    }

    async fn mark_invoice_paid(&self, order_id: Uuid) -> CheckoutResult<Invoice> {
        // A Paid invoice is immutable; the guard makes replays no-ops.
        sqlx::query(
            "UPDATE invoices SET payment_status = $1 WHERE order_id = $2 AND payment_status <> $1",
        )
        .bind(InvoiceStatus::Paid.as_str())
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.invoice_for_order(order_id).await?.ok_or_else(|| {
            CheckoutError::Internal(format!("no invoice for order {}", order_id))
        })
    }
}
