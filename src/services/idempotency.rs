use uuid::Uuid;

/// Per-attempt idempotency key for gateway intent creation.
///
/// UUIDv7 is time-ordered plus random, so two calls for the same logical
/// request made at different times get different keys and the gateway's
/// own idempotency layer will NOT collapse them. That is deliberate: the
/// duplicate-charge guard is the local succeeded-payment check plus the
/// storage constraint, and the key only protects the gateway-side retries
/// of a single attempt.
pub fn idempotency_key(booking_id: &str) -> String {
    format!("booking_{booking_id}_{}", Uuid::now_v7())
}
