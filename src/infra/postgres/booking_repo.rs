use {
    crate::domain::{
        booking::{Booking, BookingStatus},
        error::PaymentError,
        ports::BookingStore,
    },
    async_trait::async_trait,
    sqlx::{PgPool, Row},
};

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn get_for_update(&self, booking_id: &str) -> Result<Option<Booking>, PaymentError> {
        // Serialization against concurrent creation is the lock manager's
        // job; this read only needs the current row.
        let row = sqlx::query("SELECT id, reference, status FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(Booking {
                id: row.try_get("id")?,
                reference: row.try_get("reference")?,
                status: BookingStatus::try_from(status.as_str())?,
            })
        })
        .transpose()
    }

    async fn set_payment_intent(
        &self,
        booking_id: &str,
        intent_id: &str,
    ) -> Result<(), PaymentError> {
        sqlx::query("UPDATE bookings SET payment_intent_id = $2, updated_at = now() WHERE id = $1")
            .bind(booking_id)
            .bind(intent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<(), PaymentError> {
        sqlx::query("UPDATE bookings SET status = $2, updated_at = now() WHERE id = $1")
            .bind(booking_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
