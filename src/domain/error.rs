use {super::gateway::GatewayError, thiserror::Error};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount has more than two decimal places: {0}")]
    InvalidAmountPrecision(f64),

    #[error("booking id is required")]
    MissingBookingId,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("booking {0} already has a succeeded payment")]
    DuplicatePayment(String),

    #[error("a payment for booking {0} is already in flight")]
    PaymentInFlight(String),

    #[error("booking not found: {0}")]
    BookingNotFound(String),

    #[error("no payment record for intent {0}")]
    PaymentNotFound(String),

    #[error("payment creation failed")]
    PaymentCreationFailed(#[source] GatewayError),

    #[error("payment confirmation failed")]
    ConfirmationFailed(#[source] GatewayError),

    #[error("refund failed")]
    RefundFailed(#[source] GatewayError),

    #[error("payment is not refundable in status {0}")]
    PaymentNotRefundable(String),

    #[error("refund amount must be greater than zero")]
    InvalidRefundAmount,

    #[error("refund of {requested} minor units exceeds charged amount of {charged}")]
    RefundExceedsPayment { requested: i64, charged: i64 },

    #[error("webhook signature: {0}")]
    WebhookSignatureInvalid(String),

    #[error("webhook processing exceeded the {0}ms budget")]
    WebhookDeadlineExceeded(u64),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaymentError {
    /// Stable machine-readable code, exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidAmountPrecision(_) => "invalid_amount_precision",
            Self::MissingBookingId => "missing_booking_id",
            Self::InvalidEmail(_) => "invalid_email",
            Self::DuplicatePayment(_) => "duplicate_payment",
            Self::PaymentInFlight(_) => "payment_in_flight",
            Self::BookingNotFound(_) => "booking_not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::PaymentCreationFailed(_) => "payment_creation_failed",
            Self::ConfirmationFailed(_) => "confirmation_failed",
            Self::RefundFailed(_) => "refund_failed",
            Self::PaymentNotRefundable(_) => "payment_not_refundable",
            Self::InvalidRefundAmount => "invalid_refund_amount",
            Self::RefundExceedsPayment { .. } => "refund_exceeds_payment",
            Self::WebhookSignatureInvalid(_) => "webhook_signature_invalid",
            Self::WebhookDeadlineExceeded(_) => "webhook_deadline_exceeded",
            Self::Database(_) | Self::Serialization(_) => "internal_error",
        }
    }
}
