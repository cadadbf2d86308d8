use {
    super::error::PaymentError,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in minor units (pence, cents). Integer arithmetic only;
/// never persisted, always recomputed from the 2-dp major amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(minor: i64) -> Result<Self, PaymentError> {
        if minor < 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "amount cannot be negative, got {minor} minor units"
            )));
        }
        Ok(Self(minor))
    }

    /// Convert a major-unit amount to minor units. Multiplies by 100 and
    /// rounds half-up (not banker's rounding). Rejects amounts with more
    /// than two decimal digits by comparing the scaled value against its
    /// rounding rather than parsing the textual form.
    pub fn from_major(amount: f64) -> Result<Self, PaymentError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be a non-negative number, got {amount}"
            )));
        }
        let scaled = amount * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(PaymentError::InvalidAmountPrecision(amount));
        }
        Self::new(rounded as i64)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Render as a 2-dp major-unit decimal string, e.g. `7500` → `"75.00"`.
    pub fn to_major_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }
}

/// One currency per deployment. Only currencies with a 1:100 minor-unit
/// ratio are supported, since the conversion in [`MoneyAmount::from_major`]
/// assumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Gbp,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gbp => "gbp",
            Self::Usd => "usd",
            Self::Eur => "eur",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "gbp" => Ok(Self::Gbp),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            other => Err(PaymentError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}
