use uuid::Uuid;

/// Append-only audit record. Not control flow; written after the fact,
/// read back for audit and metrics reconstruction only.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub id: Uuid,
    /// Absent for events with no payment correlation (fraud warnings on
    /// unrecognized charges, customer events).
    pub payment_id: Option<Uuid>,
    pub event_type: String,
    pub source: String,
    pub detail: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewLogEntry {
    pub fn new(event_type: &str, source: &str, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_id: None,
            event_type: event_type.to_string(),
            source: source.to_string(),
            detail,
            ip: None,
            user_agent: None,
        }
    }

    pub fn for_payment(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_request_meta(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}
