use {
    crate::domain::{audit::NewLogEntry, error::PaymentError, ports::AuditLog},
    async_trait::async_trait,
    sqlx::PgPool,
};

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, entry: &NewLogEntry) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            INSERT INTO payment_log
                (id, payment_id, event_type, source, detail, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.payment_id)
        .bind(&entry.event_type)
        .bind(&entry.source)
        .bind(&entry.detail)
        .bind(entry.ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
