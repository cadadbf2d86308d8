use {super::error::PaymentError, super::money::MoneyAmount};

/// Gateway-imposed cap on statement descriptors.
const DESCRIPTOR_MAX_LEN: usize = 22;

/// Request headers we keep alongside a webhook event. Everything else is
/// dropped before persistence to bound storage and avoid log injection.
pub const PERSISTED_HEADERS: [&str; 5] = [
    "stripe-signature",
    "content-type",
    "user-agent",
    "x-forwarded-for",
    "x-real-ip",
];

/// Gate every intent creation: amount strictly positive, at most two
/// decimal digits, a booking id, and a plausible email.
pub fn validate_create_request(
    amount: f64,
    booking_id: &str,
    email: &str,
) -> Result<MoneyAmount, PaymentError> {
    if booking_id.trim().is_empty() {
        return Err(PaymentError::MissingBookingId);
    }
    if !(amount.is_finite() && amount > 0.0) {
        return Err(PaymentError::InvalidAmount(format!(
            "amount must be greater than zero, got {amount}"
        )));
    }
    if !is_valid_email(email) {
        return Err(PaymentError::InvalidEmail(email.to_string()));
    }
    MoneyAmount::from_major(amount)
}

/// Syntax check only: one `@`, non-empty local part, dotted domain,
/// no whitespace. Deliverability is the notification service's problem.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Strip anything outside letters/digits/space/period and truncate to 22
/// characters. The gateway rejects intents with anything else, so this has
/// to match its rules exactly.
pub fn sanitize_statement_descriptor(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '.')
        .take(DESCRIPTOR_MAX_LEN)
        .collect()
}

/// Allow-list filter over inbound request headers, keyed lowercase.
pub fn sanitize_headers<'a, I>(headers: I) -> serde_json::Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut kept = serde_json::Map::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if PERSISTED_HEADERS.contains(&name.as_str()) {
            kept.insert(name, serde_json::Value::String(value.to_string()));
        }
    }
    serde_json::Value::Object(kept)
}
