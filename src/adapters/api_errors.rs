use {
    crate::domain::error::PaymentError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer, not the domain.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let (status, message) = match &self.0 {
            PaymentError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PaymentError::InvalidAmount(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PaymentError::InvalidAmountPrecision(amount) => (
                StatusCode::BAD_REQUEST,
                format!("amount {amount} has sub-minor-unit precision"),
            ),
            PaymentError::MissingBookingId => {
                (StatusCode::BAD_REQUEST, "booking id is required".to_string())
            }
            PaymentError::InvalidEmail(email) => (
                StatusCode::BAD_REQUEST,
                format!("invalid email address: {email}"),
            ),
            PaymentError::DuplicatePayment(booking_id) => (
                StatusCode::CONFLICT,
                format!("booking {booking_id} already has a successful payment"),
            ),
            PaymentError::PaymentInFlight(booking_id) => (
                StatusCode::CONFLICT,
                format!("a payment for booking {booking_id} is already in progress"),
            ),
            PaymentError::BookingNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("booking {id} not found"))
            }
            PaymentError::PaymentNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("payment {id} not found"))
            }
            PaymentError::PaymentNotRefundable(status) => (
                StatusCode::BAD_REQUEST,
                format!("payment in status {status} cannot be refunded"),
            ),
            PaymentError::InvalidRefundAmount => (
                StatusCode::BAD_REQUEST,
                "refund amount must be positive".to_string(),
            ),
            PaymentError::RefundExceedsPayment { requested, charged } => (
                StatusCode::BAD_REQUEST,
                format!("refund of {requested} exceeds charged amount {charged}"),
            ),
            PaymentError::WebhookSignatureInvalid(_) => (
                StatusCode::UNAUTHORIZED,
                "invalid webhook signature".to_string(),
            ),
            // Gateway rejections surface the gateway's message; transport
            // and storage details stay in the logs.
            PaymentError::PaymentCreationFailed(_)
            | PaymentError::ConfirmationFailed(_)
            | PaymentError::RefundFailed(_) => {
                tracing::error!("gateway error: {}", self.0);
                (StatusCode::BAD_GATEWAY, self.0.to_string())
            }
            PaymentError::WebhookDeadlineExceeded(_) => {
                tracing::warn!("{}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "webhook processing deadline exceeded".to_string(),
                )
            }
            PaymentError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            PaymentError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
