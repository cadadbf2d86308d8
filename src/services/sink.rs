//! Audit trail plus counters. Payment correctness never depends on this
//! module succeeding: append failures are logged to the tracing fallback
//! and swallowed.

use {
    crate::domain::{audit::NewLogEntry, ports::AuditLog},
    serde::Serialize,
    std::sync::Arc,
    std::sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct Counters {
    intents_created: AtomicU64,
    intents_succeeded: AtomicU64,
    intents_failed: AtomicU64,
    webhooks_processed: AtomicU64,
    webhooks_failed: AtomicU64,
    webhook_ms_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub intents_created: u64,
    pub intents_succeeded: u64,
    pub intents_failed: u64,
    pub webhooks_processed: u64,
    pub webhooks_failed: u64,
    pub avg_webhook_processing_ms: u64,
}

/// Shared sink: one instance constructed at startup and handed to the
/// services that emit events. No global state.
pub struct EventSink {
    log: Arc<dyn AuditLog>,
    counters: Counters,
}

impl EventSink {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self {
            log,
            counters: Counters::default(),
        }
    }

    /// Append an audit entry; failures are logged and dropped.
    pub async fn record(&self, entry: NewLogEntry) {
        if let Err(e) = self.log.append(&entry).await {
            tracing::warn!(
                event_type = %entry.event_type,
                error = %e,
                "audit log write failed, dropping entry"
            );
        }
    }

    pub fn intent_created(&self) {
        self.counters.intents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn intent_succeeded(&self) {
        self.counters
            .intents_succeeded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn intent_failed(&self) {
        self.counters.intents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_processed(&self, duration_ms: u64) {
        self.counters
            .webhooks_processed
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .webhook_ms_total
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn webhook_failed(&self) {
        self.counters.webhooks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.counters.webhooks_processed.load(Ordering::Relaxed);
        let total_ms = self.counters.webhook_ms_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            intents_created: self.counters.intents_created.load(Ordering::Relaxed),
            intents_succeeded: self.counters.intents_succeeded.load(Ordering::Relaxed),
            intents_failed: self.counters.intents_failed.load(Ordering::Relaxed),
            webhooks_processed: processed,
            webhooks_failed: self.counters.webhooks_failed.load(Ordering::Relaxed),
            avg_webhook_processing_ms: if processed == 0 { 0 } else { total_ms / processed },
        }
    }
}
