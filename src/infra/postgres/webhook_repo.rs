//! Webhook event ledger. The insert is the claim: whichever delivery gets
//! a row back owns processing, every other concurrent delivery sees a
//! duplicate. A conflicting insert re-claims the row when the earlier
//! attempt failed and its scheduled retry time has passed, so redeliveries
//! pick up where a transiently failed handler left off.

use {
    crate::domain::{
        error::PaymentError,
        ports::WebhookStore,
        webhook::{Claim, ClaimedEvent, NewWebhookEvent},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Row},
    uuid::Uuid,
};

pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn claim(&self, event: &NewWebhookEvent) -> Result<Claim, PaymentError> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, event_id, event_type, payload, headers, signature_verified, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'processing')
            ON CONFLICT (event_id) DO UPDATE
                SET status = 'processing'
                WHERE webhook_events.status = 'failed'
                  AND webhook_events.next_retry_at <= now()
            RETURNING id, retry_count
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.headers)
        .bind(event.signature_verified)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Claim::New(ClaimedEvent {
                id: row.try_get("id")?,
                retry_count: row.try_get("retry_count")?,
            })),
            None => Ok(Claim::Duplicate),
        }
    }

    async fn mark_processed(&self, id: Uuid, duration_ms: i64) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processed', processed_at = now(), duration_ms = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed', retry_count = $2, next_retry_at = $3, last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
