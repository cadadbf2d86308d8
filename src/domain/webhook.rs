use {
    super::gateway::{ChargeSnapshot, IntentSnapshot},
    chrono::{DateTime, Duration, Utc},
    uuid::Uuid,
};

/// Redelivery backoff, indexed by retry count and clamped to the last
/// entry: 5m, 30m, 2h, 6h, 24h.
pub const RETRY_BACKOFF_MINUTES: [i64; 5] = [5, 30, 120, 360, 1440];

/// When a failed event should next be retried. `retry_count` is the value
/// *after* incrementing for the current failure, so the first failure
/// (count 1) lands on the first table entry.
pub fn next_retry_at(now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
    let idx = (retry_count.max(1) as usize - 1).min(RETRY_BACKOFF_MINUTES.len() - 1);
    now + Duration::minutes(RETRY_BACKOFF_MINUTES[idx])
}

/// Row to insert on first delivery of an external event id. The storage
/// uniqueness constraint on `event_id` is the dedup mechanism.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: serde_json::Value,
    pub signature_verified: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ClaimedEvent {
    pub id: Uuid,
    pub retry_count: i32,
}

/// Outcome of trying to claim an event for processing.
#[derive(Debug, Clone, Copy)]
pub enum Claim {
    /// We own processing.
    New(ClaimedEvent),
    /// Another worker already inserted (and may still be processing) this
    /// event id; return success without reprocessing.
    Duplicate,
}

/// Known event categories, each variant carrying only what its handler
/// needs. Dispatch is an exhaustive match, not a string switch.
#[derive(Debug, Clone)]
pub enum WebhookEventKind {
    IntentSucceeded { intent: IntentSnapshot },
    IntentFailed { intent: IntentSnapshot },
    IntentProcessing { intent_id: String },
    IntentRequiresAction {
        intent_id: String,
        action_url: Option<String>,
    },
    ChargeSucceeded {
        intent_id: Option<String>,
        charge: ChargeSnapshot,
    },
    ChargeFailed {
        intent_id: Option<String>,
        failure_code: Option<String>,
        failure_message: Option<String>,
    },
    ChargeRefunded {
        intent_id: Option<String>,
        amount_refunded: i64,
    },
    DisputeCreated {
        intent_id: Option<String>,
        charge_id: Option<String>,
        reason: Option<String>,
    },
    PaymentMethodAttached { payment_method_id: String },
    PaymentMethodDetached { payment_method_id: String },
    CustomerCreated {
        customer_id: String,
        email: Option<String>,
    },
    CustomerUpdated {
        customer_id: String,
        email: Option<String>,
    },
    EarlyFraudWarning { charge_id: Option<String> },
    /// Event types we receive but have no handler for: logged and acked.
    Unrecognized,
}

/// A signature-verified, decoded webhook delivery.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub event_id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
    pub raw: serde_json::Value,
}
