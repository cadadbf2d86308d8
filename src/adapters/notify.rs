use {
    crate::domain::{error::PaymentError, ports::Notifier},
    async_trait::async_trait,
};

/// Log-only notifier. Swapped for a mail sender in deployments that have
/// one; the call sites are fire-and-forget either way.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn payment_succeeded(&self, booking_id: &str, email: &str) -> Result<(), PaymentError> {
        tracing::info!(booking_id = %booking_id, email = %email, "payment confirmation notification");
        Ok(())
    }
}
