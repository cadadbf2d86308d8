//! Seams to the collaborators the payment core depends on. Storage
//! implementations live in `infra::postgres`; tests swap in in-memory
//! versions. Uniqueness guarantees (one succeeded payment per booking,
//! one row per external event id) belong to the store, not the caller.

use {
    super::audit::NewLogEntry,
    super::booking::{Booking, BookingStatus},
    super::error::PaymentError,
    super::payment::{NewPaymentRecord, PaymentRecord, PaymentUpdate},
    super::webhook::{Claim, DecodedEvent, NewWebhookEvent},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::time::Duration,
    uuid::Uuid,
};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment attempt. Must fail with
    /// [`PaymentError::DuplicatePayment`] if the booking already holds a
    /// succeeded payment (backed by a storage constraint, not a read).
    async fn insert(&self, record: &NewPaymentRecord) -> Result<(), PaymentError>;

    async fn has_succeeded(&self, booking_id: &str) -> Result<bool, PaymentError>;

    async fn find_by_intent(&self, intent_id: &str)
    -> Result<Option<PaymentRecord>, PaymentError>;

    /// Apply a partial update; `None` fields are left as they are.
    async fn update(&self, intent_id: &str, update: &PaymentUpdate) -> Result<(), PaymentError>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert-or-nothing on the external event id. A rejected insert means
    /// another delivery owns (or finished) processing.
    async fn claim(&self, event: &NewWebhookEvent) -> Result<Claim, PaymentError>;

    async fn mark_processed(&self, id: Uuid, duration_ms: i64) -> Result<(), PaymentError>;

    async fn record_failure(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), PaymentError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Read the booking row for a mutation that follows. Callers hold the
    /// relevant [`LockManager`] lock for the duration.
    async fn get_for_update(&self, booking_id: &str) -> Result<Option<Booking>, PaymentError>;

    async fn set_payment_intent(
        &self,
        booking_id: &str,
        intent_id: &str,
    ) -> Result<(), PaymentError>;

    async fn set_status(&self, booking_id: &str, status: BookingStatus)
    -> Result<(), PaymentError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &NewLogEntry) -> Result<(), PaymentError>;
}

/// Invoked after a payment is confirmed. Fire-and-forget: callers spawn it
/// and swallow failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_succeeded(&self, booking_id: &str, email: &str) -> Result<(), PaymentError>;
}

/// Short-TTL mutual exclusion across service instances, for multi-step
/// operations that cannot lean on a single storage constraint. Auto-expiry
/// means a crashed holder cannot wedge the system.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// `Some(token)` if acquired; `None` if another holder has it.
    async fn try_acquire(&self, name: &str, ttl: Duration)
    -> Result<Option<String>, PaymentError>;

    async fn release(&self, name: &str, token: &str) -> Result<(), PaymentError>;
}

/// Verifies the webhook signature against the shared secret and decodes
/// the payload into a typed event. Signature failure is a hard rejection.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, payload: &str, signature: &str) -> Result<DecodedEvent, PaymentError>;
}
