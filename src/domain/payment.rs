use {
    super::error::PaymentError,
    super::money::{Currency, MoneyAmount},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Gateway-reported intent statuses, mapped 1:1 to local state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }

    /// Lifecycle rank, higher means further along. Used to stop
    /// out-of-order webhook deliveries from regressing status.
    pub fn rank(&self) -> u8 {
        match self {
            Self::RequiresPaymentMethod => 0,
            Self::RequiresConfirmation => 1,
            Self::RequiresAction => 2,
            Self::Processing => 3,
            Self::Succeeded | Self::Failed | Self::Canceled => 4,
            Self::Refunded => 5,
        }
    }

    /// Failed, Canceled and Refunded accept nothing further; Succeeded
    /// accepts only Refunded.
    pub fn can_transition_to(&self, new: &PaymentStatus) -> bool {
        match (self, new) {
            (Self::Succeeded, Self::Refunded) => true,
            (Self::Succeeded | Self::Failed | Self::Canceled | Self::Refunded, _) => false,
            // Any non-terminal state can fail, be canceled, or jump
            // forward (webhooks may arrive out of order).
            (_, Self::Failed | Self::Canceled) => true,
            (from, to) => to.rank() > from.rank(),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "requires_payment_method" => Ok(Self::RequiresPaymentMethod),
            "requires_confirmation" => Ok(Self::RequiresConfirmation),
            "requires_action" => Ok(Self::RequiresAction),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "refunded" => Ok(Self::Refunded),
            other => Err(PaymentError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// One row per payment attempt. Financial records: created at intent
/// creation, mutated by confirmation/webhooks, never deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub booking_id: String,
    pub gateway_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub idempotency_key: String,
    /// Major units, 2-dp decimal string. The minor-unit value is
    /// recomputed on demand, never stored.
    pub amount: String,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub receipt_url: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub risk_level: Option<String>,
    pub risk_score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Minor-unit amount recomputed from the persisted decimal string.
    /// Integer parsing only; the stored format is always `units.cc`.
    pub fn amount_minor(&self) -> Result<MoneyAmount, PaymentError> {
        let invalid = || PaymentError::InvalidAmount(self.amount.clone());
        let (units, cents) = self.amount.split_once('.').ok_or_else(invalid)?;
        if cents.len() != 2 {
            return Err(invalid());
        }
        let units: i64 = units.parse().map_err(|_| invalid())?;
        let cents: i64 = cents.parse().map_err(|_| invalid())?;
        MoneyAmount::new(units * 100 + cents)
    }
}

/// For INSERT. The id is generated in Rust via `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub booking_id: String,
    pub gateway_intent_id: String,
    pub idempotency_key: String,
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub customer_email: String,
    pub customer_name: Option<String>,
}

/// Partial update derived from a gateway snapshot; `None` fields are left
/// untouched by the store.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub status: Option<PaymentStatus>,
    pub charge_id: Option<String>,
    pub receipt_url: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub risk_level: Option<String>,
    pub risk_score: Option<i64>,
}

impl PaymentUpdate {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.charge_id.is_none()
            && self.receipt_url.is_none()
            && self.card_brand.is_none()
            && self.card_last4.is_none()
            && self.failure_code.is_none()
            && self.failure_message.is_none()
            && self.risk_level.is_none()
            && self.risk_score.is_none()
    }
}
