pub mod idempotency;
pub mod payments;
pub mod retry;
pub mod sink;
pub mod webhooks;
