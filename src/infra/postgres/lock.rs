//! TTL lock table. A lock is one row in `service_locks`; an expired row
//! can be stolen by the conditional upsert, so a crashed holder never
//! wedges the name for longer than the TTL.

use {
    crate::domain::{error::PaymentError, ports::LockManager},
    async_trait::async_trait,
    sqlx::PgPool,
    std::time::Duration,
    uuid::Uuid,
};

pub struct PgLockManager {
    pool: PgPool,
}

impl PgLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<String>, PaymentError> {
        let token = Uuid::now_v7().to_string();
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO service_locks (name, holder, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE
                SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
                WHERE service_locks.expires_at < now()
            RETURNING holder
            "#,
        )
        .bind(name)
        .bind(&token)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|_| token))
    }

    async fn release(&self, name: &str, token: &str) -> Result<(), PaymentError> {
        // Token check keeps an expired holder from deleting a lock that
        // was since re-acquired by someone else.
        sqlx::query("DELETE FROM service_locks WHERE name = $1 AND holder = $2")
            .bind(name)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
