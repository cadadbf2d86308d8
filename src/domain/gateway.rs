use {
    super::money::{Currency, MoneyAmount},
    super::payment::PaymentStatus,
    async_trait::async_trait,
    std::collections::HashMap,
    thiserror::Error,
};

/// Failure from an outbound gateway call, normalized so the retry executor
/// can classify it without knowing the gateway's SDK types.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered and said no. Carries the HTTP status so
    /// card declines, invalid requests and bad credentials (4xx) can be
    /// told apart from server-side trouble (5xx).
    #[error("gateway rejected request (status {http_status}, code {code:?}): {message}")]
    Rejected {
        http_status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Rate limiting, server errors, timeouts and transport failures are
    /// worth another attempt. Everything the gateway rejected outright
    /// (card declined, invalid request, authentication) is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected { http_status, .. } => {
                *http_status == 408 || *http_status == 429 || (500..600).contains(http_status)
            }
            Self::Timeout | Self::Transport(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub amount: MoneyAmount,
    pub currency: Currency,
    /// Sent with the request so gateway-side retries with the same key
    /// cannot double-charge.
    pub idempotency_key: String,
    pub receipt_email: String,
    pub statement_descriptor: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub intent_id: String,
    /// `None` refunds the full remaining balance.
    pub amount: Option<MoneyAmount>,
    pub reason: Option<RefundReason>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    RequestedByCustomer,
}

impl RefundReason {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "duplicate" => Some(Self::Duplicate),
            "fraudulent" => Some(Self::Fraudulent),
            "requested_by_customer" => Some(Self::RequestedByCustomer),
            _ => None,
        }
    }
}

/// Charge-level outcome detail, present once a charge exists and the
/// intent was retrieved with the charge expanded.
#[derive(Debug, Clone, Default)]
pub struct ChargeSnapshot {
    pub charge_id: String,
    pub receipt_url: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub risk_level: Option<String>,
    pub risk_score: Option<i64>,
}

/// The gateway's current view of a payment intent.
#[derive(Debug, Clone)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub charge: Option<ChargeSnapshot>,
    pub next_action_url: Option<String>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundSnapshot {
    pub refund_id: String,
    pub status: Option<String>,
    pub amount_minor: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<IntentSnapshot, GatewayError>;

    /// Retrieve with charge and outcome data expanded.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentSnapshot, GatewayError>;

    async fn create_refund(&self, request: &RefundRequest) -> Result<RefundSnapshot, GatewayError>;
}
