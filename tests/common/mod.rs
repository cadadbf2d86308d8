#![allow(dead_code)]

use coursepay::domain::booking::{Booking, BookingStatus};
use coursepay::domain::error::PaymentError;
use coursepay::domain::gateway::{
    CreateIntentRequest, GatewayError, IntentSnapshot, PaymentGateway, RefundRequest,
    RefundSnapshot,
};
use coursepay::domain::money::MoneyAmount;
use coursepay::domain::payment::{
    NewPaymentRecord, PaymentRecord, PaymentStatus, PaymentUpdate,
};
use coursepay::domain::ports::{
    AuditLog, BookingStore, EventDecoder, LockManager, Notifier, PaymentStore, WebhookStore,
};
use coursepay::domain::webhook::{Claim, ClaimedEvent, DecodedEvent, NewWebhookEvent};
use coursepay::domain::audit::NewLogEntry;
use coursepay::services::payments::{PaymentConfig, PaymentService};
use coursepay::services::retry::RetryOptions;
use coursepay::services::sink::EventSink;
use coursepay::services::webhooks::WebhookEngine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

// ── In-memory payment store ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemPayments {
    rows: Mutex<Vec<PaymentRecord>>,
    /// Per-call read delay, for deadline tests.
    read_delay: Mutex<Option<Duration>>,
}

impl MemPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_delay(delay: Duration) -> Self {
        let store = Self::default();
        store.set_read_delay(Some(delay));
        store
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn all(&self) -> Vec<PaymentRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn by_intent(&self, intent_id: &str) -> Option<PaymentRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.gateway_intent_id.as_deref() == Some(intent_id))
            .cloned()
    }

    /// Seed a row directly, bypassing the insert checks.
    pub fn seed(&self, record: PaymentRecord) {
        self.rows.lock().unwrap().push(record);
    }
}

#[async_trait]
impl PaymentStore for MemPayments {
    async fn insert(&self, record: &NewPaymentRecord) -> Result<(), PaymentError> {
        let mut rows = self.rows.lock().unwrap();
        let duplicate_succeeded = record.status == PaymentStatus::Succeeded
            && rows
                .iter()
                .any(|r| r.booking_id == record.booking_id && r.status == PaymentStatus::Succeeded);
        let duplicate_intent = rows
            .iter()
            .any(|r| r.gateway_intent_id.as_deref() == Some(record.gateway_intent_id.as_str()));
        if duplicate_succeeded || duplicate_intent {
            return Err(PaymentError::DuplicatePayment(record.booking_id.clone()));
        }
        rows.push(PaymentRecord {
            id: record.id,
            booking_id: record.booking_id.clone(),
            gateway_intent_id: Some(record.gateway_intent_id.clone()),
            charge_id: None,
            idempotency_key: record.idempotency_key.clone(),
            amount: record.amount.to_major_string(),
            currency: record.currency,
            status: record.status,
            customer_email: record.customer_email.clone(),
            customer_name: record.customer_name.clone(),
            receipt_url: None,
            card_brand: None,
            card_last4: None,
            failure_code: None,
            failure_message: None,
            risk_level: None,
            risk_score: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn has_succeeded(&self, booking_id: &str) -> Result<bool, PaymentError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.booking_id == booking_id && r.status == PaymentStatus::Succeeded))
    }

    async fn find_by_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.by_intent(intent_id))
    }

    async fn update(&self, intent_id: &str, update: &PaymentUpdate) -> Result<(), PaymentError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.gateway_intent_id.as_deref() == Some(intent_id))
        {
            if let Some(status) = update.status {
                row.status = status;
            }
            if let Some(v) = &update.charge_id {
                row.charge_id = Some(v.clone());
            }
            if let Some(v) = &update.receipt_url {
                row.receipt_url = Some(v.clone());
            }
            if let Some(v) = &update.card_brand {
                row.card_brand = Some(v.clone());
            }
            if let Some(v) = &update.card_last4 {
                row.card_last4 = Some(v.clone());
            }
            if let Some(v) = &update.failure_code {
                row.failure_code = Some(v.clone());
            }
            if let Some(v) = &update.failure_message {
                row.failure_message = Some(v.clone());
            }
            if let Some(v) = &update.risk_level {
                row.risk_level = Some(v.clone());
            }
            if let Some(v) = update.risk_score {
                row.risk_score = Some(v);
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ── In-memory webhook event store ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub status: String,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Default)]
pub struct MemWebhooks {
    rows: Mutex<Vec<StoredEvent>>,
}

impl MemWebhooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_event_id(&self, event_id: &str) -> Option<StoredEvent> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Pull a failed event's scheduled retry into the past, so the next
    /// delivery is eligible to re-claim it without waiting out the backoff.
    pub fn expire_retry(&self, event_id: &str) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|e| e.event_id == event_id) {
            row.next_retry_at = Some(Utc::now() - chrono::Duration::minutes(1));
        }
    }
}

#[async_trait]
impl WebhookStore for MemWebhooks {
    async fn claim(&self, event: &NewWebhookEvent) -> Result<Claim, PaymentError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|e| e.event_id == event.event_id) {
            // A failed row whose retry time has passed is re-claimed by
            // the next delivery, mirroring the conditional upsert in the
            // Postgres store.
            let retry_due = row.status == "failed"
                && row.next_retry_at.is_some_and(|at| at <= Utc::now());
            if retry_due {
                row.status = "processing".to_string();
                return Ok(Claim::New(ClaimedEvent {
                    id: row.id,
                    retry_count: row.retry_count,
                }));
            }
            return Ok(Claim::Duplicate);
        }
        let id = Uuid::now_v7();
        rows.push(StoredEvent {
            id,
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            status: "processing".to_string(),
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            duration_ms: None,
        });
        Ok(Claim::New(ClaimedEvent { id, retry_count: 0 }))
    }

    async fn mark_processed(&self, id: Uuid, duration_ms: i64) -> Result<(), PaymentError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|e| e.id == id) {
            row.status = "processed".to_string();
            row.duration_ms = Some(duration_ms);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), PaymentError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|e| e.id == id) {
            row.status = "failed".to_string();
            row.retry_count = retry_count;
            row.next_retry_at = Some(next_retry_at);
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

// ── In-memory booking store ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemBookings {
    rows: Mutex<HashMap<String, Booking>>,
    intents: Mutex<HashMap<String, String>>,
}

impl MemBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, booking: Booking) {
        self.rows.lock().unwrap().insert(booking.id.clone(), booking);
    }

    pub fn status_of(&self, booking_id: &str) -> Option<BookingStatus> {
        self.rows.lock().unwrap().get(booking_id).map(|b| b.status)
    }

    pub fn intent_of(&self, booking_id: &str) -> Option<String> {
        self.intents.lock().unwrap().get(booking_id).cloned()
    }
}

#[async_trait]
impl BookingStore for MemBookings {
    async fn get_for_update(&self, booking_id: &str) -> Result<Option<Booking>, PaymentError> {
        Ok(self.rows.lock().unwrap().get(booking_id).cloned())
    }

    async fn set_payment_intent(
        &self,
        booking_id: &str,
        intent_id: &str,
    ) -> Result<(), PaymentError> {
        self.intents
            .lock()
            .unwrap()
            .insert(booking_id.to_string(), intent_id.to_string());
        Ok(())
    }

    async fn set_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<(), PaymentError> {
        if let Some(b) = self.rows.lock().unwrap().get_mut(booking_id) {
            b.status = status;
        }
        Ok(())
    }
}

// ── In-memory audit log ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemAudit {
    entries: Mutex<Vec<NewLogEntry>>,
}

impl MemAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_of_type(&self, event_type: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn entries(&self) -> Vec<NewLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for MemAudit {
    async fn append(&self, entry: &NewLogEntry) -> Result<(), PaymentError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ── In-memory TTL lock manager ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemLocks {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-hold a lock so a subsequent acquire fails.
    pub fn hold(&self, name: &str, ttl: Duration) {
        self.held.lock().unwrap().insert(
            name.to_string(),
            ("held-elsewhere".to_string(), Instant::now() + ttl),
        );
    }
}

#[async_trait]
impl LockManager for MemLocks {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<String>, PaymentError> {
        let mut held = self.held.lock().unwrap();
        if let Some((_, expires)) = held.get(name) {
            if *expires > Instant::now() {
                return Ok(None);
            }
        }
        let token = Uuid::now_v7().to_string();
        held.insert(name.to_string(), (token.clone(), Instant::now() + ttl));
        Ok(Some(token))
    }

    async fn release(&self, name: &str, token: &str) -> Result<(), PaymentError> {
        let mut held = self.held.lock().unwrap();
        if held.get(name).is_some_and(|(t, _)| t == token) {
            held.remove(name);
        }
        Ok(())
    }
}

// ── Recording notifier ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.notified.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn payment_succeeded(&self, booking_id: &str, email: &str) -> Result<(), PaymentError> {
        self.notified
            .lock()
            .unwrap()
            .push((booking_id.to_string(), email.to_string()));
        Ok(())
    }
}

// ── Scripted mock gateway ──────────────────────────────────────────────────

/// Every call pops the next scripted result; an unscripted call panics so
/// a test can assert "no gateway call happened" by scripting nothing.
#[derive(Default)]
pub struct MockGateway {
    pub create_calls: AtomicU32,
    pub retrieve_calls: AtomicU32,
    pub refund_calls: AtomicU32,
    create_script: Mutex<VecDeque<Result<IntentSnapshot, GatewayError>>>,
    retrieve_script: Mutex<VecDeque<Result<IntentSnapshot, GatewayError>>>,
    refund_script: Mutex<VecDeque<Result<RefundSnapshot, GatewayError>>>,
    /// Delay applied inside `create_intent`, to widen the window where a
    /// creation lock is held.
    create_delay: Mutex<Option<Duration>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_create(&self, result: Result<IntentSnapshot, GatewayError>) {
        self.create_script.lock().unwrap().push_back(result);
    }

    pub fn script_retrieve(&self, result: Result<IntentSnapshot, GatewayError>) {
        self.retrieve_script.lock().unwrap().push_back(result);
    }

    pub fn script_refund(&self, result: Result<RefundSnapshot, GatewayError>) {
        self.refund_script.lock().unwrap().push_back(result);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        _request: &CreateIntentRequest,
    ) -> Result<IntentSnapshot, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.create_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted create_intent call")
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<IntentSnapshot, GatewayError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.retrieve_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted retrieve_intent call")
    }

    async fn create_refund(&self, _request: &RefundRequest) -> Result<RefundSnapshot, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.refund_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted create_refund call")
    }
}

// ── Canned decoder ─────────────────────────────────────────────────────────

/// Maps the signature string to a pre-built decoded event; any other
/// signature is rejected as invalid.
#[derive(Default)]
pub struct CannedDecoder {
    events: Mutex<HashMap<String, DecodedEvent>>,
}

impl CannedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, signature: &str, event: DecodedEvent) {
        self.events
            .lock()
            .unwrap()
            .insert(signature.to_string(), event);
    }
}

impl EventDecoder for CannedDecoder {
    fn decode(&self, _payload: &str, signature: &str) -> Result<DecodedEvent, PaymentError> {
        self.events
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| PaymentError::WebhookSignatureInvalid("bad signature".to_string()))
    }
}

// ── Builders ───────────────────────────────────────────────────────────────

pub fn booking(id: &str) -> Booking {
    Booking {
        id: id.to_string(),
        reference: format!("REF-{id}"),
        status: BookingStatus::Pending,
    }
}

pub fn intent_snapshot(intent_id: &str, status: PaymentStatus, amount_minor: i64) -> IntentSnapshot {
    IntentSnapshot {
        intent_id: intent_id.to_string(),
        client_secret: Some(format!("{intent_id}_secret")),
        status,
        amount_minor,
        charge: None,
        next_action_url: None,
        last_error_code: None,
        last_error_message: None,
    }
}

pub fn decoded_event(event_id: &str, event_type: &str, kind: coursepay::domain::webhook::WebhookEventKind) -> DecodedEvent {
    DecodedEvent {
        event_id: event_id.to_string(),
        event_type: event_type.to_string(),
        kind,
        raw: serde_json::json!({ "id": event_id, "type": event_type }),
    }
}

pub fn fast_retry() -> RetryOptions {
    RetryOptions {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2,
    }
}

pub fn rejected(http_status: u16, code: &str) -> GatewayError {
    GatewayError::Rejected {
        http_status,
        code: Some(code.to_string()),
        message: format!("{code} ({http_status})"),
    }
}

pub fn seeded_record(intent_id: &str, booking_id: &str, status: PaymentStatus, amount: MoneyAmount) -> PaymentRecord {
    PaymentRecord {
        id: Uuid::now_v7(),
        booking_id: booking_id.to_string(),
        gateway_intent_id: Some(intent_id.to_string()),
        charge_id: None,
        idempotency_key: format!("booking_{booking_id}_test"),
        amount: amount.to_major_string(),
        currency: coursepay::domain::money::Currency::Gbp,
        status,
        customer_email: "student@example.com".to_string(),
        customer_name: None,
        receipt_url: None,
        card_brand: None,
        card_last4: None,
        failure_code: None,
        failure_message: None,
        risk_level: None,
        risk_score: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ── Harnesses ──────────────────────────────────────────────────────────────

pub struct PaymentHarness {
    pub gateway: Arc<MockGateway>,
    pub payments: Arc<MemPayments>,
    pub bookings: Arc<MemBookings>,
    pub notifier: Arc<RecordingNotifier>,
    pub locks: Arc<MemLocks>,
    pub audit: Arc<MemAudit>,
    pub sink: Arc<EventSink>,
    pub service: PaymentService,
}

impl PaymentHarness {
    pub fn new() -> Self {
        let gateway = Arc::new(MockGateway::new());
        let payments = Arc::new(MemPayments::new());
        let bookings = Arc::new(MemBookings::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let locks = Arc::new(MemLocks::new());
        let audit = Arc::new(MemAudit::new());
        let sink = Arc::new(EventSink::new(audit.clone()));
        let service = PaymentService::new(
            gateway.clone(),
            payments.clone(),
            bookings.clone(),
            notifier.clone(),
            locks.clone(),
            sink.clone(),
            PaymentConfig {
                retry: fast_retry(),
                ..PaymentConfig::default()
            },
        );
        Self {
            gateway,
            payments,
            bookings,
            notifier,
            locks,
            audit,
            sink,
            service,
        }
    }
}

pub struct WebhookHarness {
    pub decoder: Arc<CannedDecoder>,
    pub events: Arc<MemWebhooks>,
    pub payments: Arc<MemPayments>,
    pub bookings: Arc<MemBookings>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<MemAudit>,
    pub sink: Arc<EventSink>,
    pub engine: WebhookEngine,
}

impl WebhookHarness {
    pub fn new() -> Self {
        Self::with_payments_and_deadline(Arc::new(MemPayments::new()), Duration::from_secs(25))
    }

    pub fn with_payments_and_deadline(payments: Arc<MemPayments>, deadline: Duration) -> Self {
        let decoder = Arc::new(CannedDecoder::new());
        let events = Arc::new(MemWebhooks::new());
        let bookings = Arc::new(MemBookings::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let audit = Arc::new(MemAudit::new());
        let sink = Arc::new(EventSink::new(audit.clone()));
        let engine = WebhookEngine::new(
            decoder.clone(),
            events.clone(),
            payments.clone(),
            bookings.clone(),
            notifier.clone(),
            sink.clone(),
            deadline,
        );
        Self {
            decoder,
            events,
            payments,
            bookings,
            notifier,
            audit,
            sink,
            engine,
        }
    }
}

pub const NO_HEADERS: &[(String, String)] = &[];
