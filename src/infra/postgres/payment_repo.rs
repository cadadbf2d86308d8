//! Payment row storage. Amounts are stored as 2-dp major-unit decimal
//! strings, the minor-unit value is recomputed in code. The partial unique
//! index on `(booking_id) WHERE status = 'succeeded'` is the
//! cross-instance guarantee behind the duplicate-payment check.

use {
    crate::domain::{
        error::PaymentError,
        money::Currency,
        payment::{NewPaymentRecord, PaymentRecord, PaymentStatus, PaymentUpdate},
        ports::PaymentStore,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Row, postgres::PgRow},
    uuid::Uuid,
};

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, record: &NewPaymentRecord) -> Result<(), PaymentError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments
                (id, booking_id, gateway_intent_id, idempotency_key,
                 amount, currency, status, customer_email, customer_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.booking_id)
        .bind(&record.gateway_intent_id)
        .bind(&record.idempotency_key)
        .bind(record.amount.to_major_string())
        .bind(record.currency.as_str())
        .bind(record.status.as_str())
        .bind(&record.customer_email)
        .bind(record.customer_name.as_deref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(PaymentError::DuplicatePayment(record.booking_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn has_succeeded(&self, booking_id: &str) -> Result<bool, PaymentError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE booking_id = $1 AND status = 'succeeded')",
        )
        .bind(booking_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_by_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let row = sqlx::query(
            r#"
            SELECT id, booking_id, gateway_intent_id, charge_id, idempotency_key,
                   amount, currency, status, customer_email, customer_name,
                   receipt_url, card_brand, card_last4, failure_code, failure_message,
                   risk_level, risk_score, created_at, updated_at
            FROM payments
            WHERE gateway_intent_id = $1
            "#,
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn update(&self, intent_id: &str, update: &PaymentUpdate) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            UPDATE payments SET
                status = COALESCE($2, status),
                charge_id = COALESCE($3, charge_id),
                receipt_url = COALESCE($4, receipt_url),
                card_brand = COALESCE($5, card_brand),
                card_last4 = COALESCE($6, card_last4),
                failure_code = COALESCE($7, failure_code),
                failure_message = COALESCE($8, failure_message),
                risk_level = COALESCE($9, risk_level),
                risk_score = COALESCE($10, risk_score),
                updated_at = now()
            WHERE gateway_intent_id = $1
            "#,
        )
        .bind(intent_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.charge_id.as_deref())
        .bind(update.receipt_url.as_deref())
        .bind(update.card_brand.as_deref())
        .bind(update.card_last4.as_deref())
        .bind(update.failure_code.as_deref())
        .bind(update.failure_message.as_deref())
        .bind(update.risk_level.as_deref())
        .bind(update.risk_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn record_from_row(row: PgRow) -> Result<PaymentRecord, PaymentError> {
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(PaymentRecord {
        id: row.try_get::<Uuid, _>("id")?,
        booking_id: row.try_get("booking_id")?,
        gateway_intent_id: row.try_get("gateway_intent_id")?,
        charge_id: row.try_get("charge_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        amount: row.try_get("amount")?,
        currency: Currency::try_from(currency.as_str())?,
        status: PaymentStatus::try_from(status.as_str())?,
        customer_email: row.try_get("customer_email")?,
        customer_name: row.try_get("customer_name")?,
        receipt_url: row.try_get("receipt_url")?,
        card_brand: row.try_get("card_brand")?,
        card_last4: row.try_get("card_last4")?,
        failure_code: row.try_get("failure_code")?,
        failure_message: row.try_get("failure_message")?,
        risk_level: row.try_get("risk_level")?,
        risk_score: row.try_get("risk_score")?,
        created_at,
        updated_at,
    })
}
