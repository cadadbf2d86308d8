use {
    super::error::PaymentError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    /// Set by chargeback webhooks. Externally reversible (the dispute may
    /// be won), so nothing here treats it as final or auto-refunds it.
    Disputed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BookingStatus {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "disputed" => Ok(Self::Disputed),
            other => Err(PaymentError::Validation(format!(
                "unknown booking status: {other}"
            ))),
        }
    }
}

/// The slice of a booking row the payment core needs.
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: String,
    /// Human-facing reference, goes on the card statement descriptor.
    pub reference: String,
    pub status: BookingStatus,
}
