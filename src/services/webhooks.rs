//! Webhook ingestion: verify, claim, dispatch, and reconcile. Delivery is
//! at-least-once and unordered, so every handler must be idempotent and
//! tolerate events arriving late or out of sequence.

use {
    super::sink::EventSink,
    crate::domain::{
        audit::NewLogEntry,
        booking::BookingStatus,
        error::PaymentError,
        gateway::{ChargeSnapshot, IntentSnapshot},
        payment::{PaymentStatus, PaymentUpdate},
        ports::{BookingStore, EventDecoder, Notifier, PaymentStore, WebhookStore},
        validate::sanitize_headers,
        webhook::{Claim, DecodedEvent, NewWebhookEvent, WebhookEventKind, next_retry_at},
    },
    chrono::Utc,
    serde::Serialize,
    std::sync::Arc,
    std::time::{Duration, Instant},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
}

impl WebhookAck {
    fn for_event(event: &DecodedEvent) -> Self {
        Self {
            received: true,
            event_id: Some(event.event_id.clone()),
            event_type: Some(event.event_type.clone()),
        }
    }
}

pub struct WebhookEngine {
    decoder: Arc<dyn EventDecoder>,
    events: Arc<dyn WebhookStore>,
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<EventSink>,
    /// Soft deadline for a single event. Hitting it schedules a retry but
    /// does not cancel in-flight handler work; handlers must be safe to
    /// abandon mid-step.
    deadline: Duration,
}

impl WebhookEngine {
    pub fn new(
        decoder: Arc<dyn EventDecoder>,
        events: Arc<dyn WebhookStore>,
        payments: Arc<dyn PaymentStore>,
        bookings: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<EventSink>,
        deadline: Duration,
    ) -> Self {
        Self {
            decoder,
            events,
            payments,
            bookings,
            notifier,
            sink,
            deadline,
        }
    }

    #[tracing::instrument(
        name = "webhook",
        skip_all,
        fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
    )]
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &str,
        headers: &[(String, String)],
    ) -> Result<WebhookAck, PaymentError> {
        // A missing signature header is recorded the same way as a forged
        // one: rejected deliveries are security events either way.
        let decoded = signature
            .ok_or_else(|| {
                PaymentError::WebhookSignatureInvalid("missing signature header".to_string())
            })
            .and_then(|sig| self.decoder.decode(payload, sig));
        let event = match decoded {
            Ok(event) => event,
            Err(e @ PaymentError::WebhookSignatureInvalid(_)) => {
                self.sink.webhook_failed();
                self.sink
                    .record(NewLogEntry::new(
                        "webhook_failed",
                        "webhook",
                        serde_json::json!({
                            "reason": "signature_verification_failed",
                            "error": e.to_string(),
                        }),
                    ))
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        tracing::Span::current()
            .record("event_id", tracing::field::display(&event.event_id))
            .record("event_type", tracing::field::display(&event.event_type));

        let row = NewWebhookEvent {
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.raw.clone(),
            headers: sanitize_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            signature_verified: true,
        };

        // The uniqueness constraint on event_id does the dedup: a rejected
        // insert means another delivery owns (or finished) this event. A
        // failed event past its scheduled retry time is re-claimed instead,
        // so redeliveries retry it rather than being swallowed as
        // duplicates.
        let claimed = match self.events.claim(&row).await? {
            Claim::New(claimed) => claimed,
            Claim::Duplicate => {
                tracing::info!("duplicate webhook delivery, skipping");
                return Ok(WebhookAck::for_event(&event));
            }
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.deadline, self.dispatch(&event)).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::WebhookDeadlineExceeded(
                self.deadline.as_millis() as u64,
            )),
        };
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(()) => {
                self.events.mark_processed(claimed.id, elapsed_ms).await?;
                self.sink.webhook_processed(elapsed_ms as u64);
                self.sink
                    .record(NewLogEntry::new(
                        "webhook_processed",
                        "webhook",
                        serde_json::json!({
                            "event_id": event.event_id,
                            "event_type": event.event_type,
                            "duration_ms": elapsed_ms,
                        }),
                    ))
                    .await;
                Ok(WebhookAck::for_event(&event))
            }
            Err(e) => {
                let retry_count = claimed.retry_count + 1;
                let next = next_retry_at(Utc::now(), retry_count);
                self.events
                    .record_failure(claimed.id, retry_count, next, &e.to_string())
                    .await?;
                self.sink.webhook_failed();
                self.sink
                    .record(NewLogEntry::new(
                        "webhook_failed",
                        "webhook",
                        serde_json::json!({
                            "event_id": event.event_id,
                            "event_type": event.event_type,
                            "retry_count": retry_count,
                            "next_retry_at": next.to_rfc3339(),
                            "error": e.to_string(),
                        }),
                    ))
                    .await;
                // Re-raise so the gateway is signalled to redeliver.
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event: &DecodedEvent) -> Result<(), PaymentError> {
        match &event.kind {
            WebhookEventKind::IntentSucceeded { intent } => self.on_intent_succeeded(intent).await,
            WebhookEventKind::IntentFailed { intent } => self.on_intent_failed(intent).await,
            WebhookEventKind::IntentProcessing { intent_id } => {
                self.advance_status(intent_id, PaymentStatus::Processing, "payment_processing")
                    .await
            }
            WebhookEventKind::IntentRequiresAction {
                intent_id,
                action_url,
            } => {
                self.advance_status(
                    intent_id,
                    PaymentStatus::RequiresAction,
                    "payment_requires_action",
                )
                .await?;
                if let Some(url) = action_url {
                    tracing::info!(action_url = %url, "intent awaiting customer action");
                }
                Ok(())
            }
            WebhookEventKind::ChargeSucceeded { intent_id, charge } => {
                self.on_charge_succeeded(intent_id.as_deref(), charge).await
            }
            WebhookEventKind::ChargeFailed {
                intent_id,
                failure_code,
                failure_message,
            } => {
                self.on_charge_failed(
                    intent_id.as_deref(),
                    failure_code.clone(),
                    failure_message.clone(),
                )
                .await
            }
            WebhookEventKind::ChargeRefunded {
                intent_id,
                amount_refunded,
            } => {
                self.on_charge_refunded(intent_id.as_deref(), *amount_refunded)
                    .await
            }
            WebhookEventKind::DisputeCreated {
                intent_id,
                charge_id,
                reason,
            } => {
                self.on_dispute_created(intent_id.as_deref(), charge_id.as_deref(), reason.clone())
                    .await
            }
            WebhookEventKind::PaymentMethodAttached { payment_method_id } => {
                self.log_only(
                    "payment_method_attached",
                    serde_json::json!({ "payment_method_id": payment_method_id }),
                )
                .await
            }
            WebhookEventKind::PaymentMethodDetached { payment_method_id } => {
                self.log_only(
                    "payment_method_detached",
                    serde_json::json!({ "payment_method_id": payment_method_id }),
                )
                .await
            }
            WebhookEventKind::CustomerCreated { customer_id, email } => {
                self.log_only(
                    "customer_created",
                    serde_json::json!({ "customer_id": customer_id, "email": email }),
                )
                .await
            }
            WebhookEventKind::CustomerUpdated { customer_id, email } => {
                self.log_only(
                    "customer_updated",
                    serde_json::json!({ "customer_id": customer_id, "email": email }),
                )
                .await
            }
            WebhookEventKind::EarlyFraudWarning { charge_id } => {
                // No payment correlation required; fraud warnings on
                // unrecognized charges are still recorded.
                self.log_only(
                    "fraud_warning",
                    serde_json::json!({ "charge_id": charge_id }),
                )
                .await
            }
            WebhookEventKind::Unrecognized => {
                self.log_only(
                    "webhook_unhandled",
                    serde_json::json!({ "event_type": event.event_type }),
                )
                .await
            }
        }
    }

    async fn on_intent_succeeded(&self, intent: &IntentSnapshot) -> Result<(), PaymentError> {
        let Some(record) = self.payments.find_by_intent(&intent.intent_id).await? else {
            tracing::warn!(intent_id = %intent.intent_id, "succeeded event with no local record");
            self.log_only(
                "webhook_orphaned",
                serde_json::json!({ "gateway_intent_id": intent.intent_id }),
            )
            .await?;
            return Ok(());
        };

        let mut update = charge_update(intent.charge.as_ref());
        let newly_succeeded = record.status != PaymentStatus::Succeeded
            && record.status.can_transition_to(&PaymentStatus::Succeeded);
        if newly_succeeded {
            update.status = Some(PaymentStatus::Succeeded);
        }
        if !update.is_empty() {
            self.payments.update(&intent.intent_id, &update).await?;
        }

        if newly_succeeded {
            self.bookings
                .set_status(&record.booking_id, BookingStatus::Confirmed)
                .await?;
            self.sink.intent_succeeded();
            self.sink
                .record(
                    NewLogEntry::new(
                        "payment_success",
                        "webhook",
                        serde_json::json!({
                            "booking_id": record.booking_id,
                            "gateway_intent_id": intent.intent_id,
                        }),
                    )
                    .for_payment(record.id),
                )
                .await;

            let notifier = Arc::clone(&self.notifier);
            let booking_id = record.booking_id.clone();
            let email = record.customer_email.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.payment_succeeded(&booking_id, &email).await {
                    tracing::warn!(booking_id = %booking_id, error = %e, "success notification failed");
                }
            });
        } else {
            // Replay or out-of-order duplicate; state is already final.
            tracing::info!(intent_id = %intent.intent_id, status = %record.status, "succeeded event was a no-op");
        }
        Ok(())
    }

    async fn on_intent_failed(&self, intent: &IntentSnapshot) -> Result<(), PaymentError> {
        let Some(record) = self.payments.find_by_intent(&intent.intent_id).await? else {
            tracing::warn!(intent_id = %intent.intent_id, "failed event with no local record");
            return Ok(());
        };

        let mut update = PaymentUpdate {
            failure_code: intent.last_error_code.clone(),
            failure_message: intent.last_error_message.clone(),
            ..PaymentUpdate::default()
        };
        let newly_failed = record.status.can_transition_to(&PaymentStatus::Failed);
        if newly_failed {
            update.status = Some(PaymentStatus::Failed);
        }
        self.payments.update(&intent.intent_id, &update).await?;

        if newly_failed {
            self.sink.intent_failed();
        }
        self.sink
            .record(
                NewLogEntry::new(
                    "payment_failed",
                    "webhook",
                    serde_json::json!({
                        "gateway_intent_id": intent.intent_id,
                        "failure_code": intent.last_error_code,
                        "failure_message": intent.last_error_message,
                    }),
                )
                .for_payment(record.id),
            )
            .await;
        Ok(())
    }

    /// Move an intent forward to `status` if the lifecycle allows it;
    /// same-status replays and regressions are logged no-ops.
    async fn advance_status(
        &self,
        intent_id: &str,
        status: PaymentStatus,
        event_type: &str,
    ) -> Result<(), PaymentError> {
        let Some(record) = self.payments.find_by_intent(intent_id).await? else {
            tracing::warn!(intent_id = %intent_id, "event with no local record");
            return Ok(());
        };
        if record.status == status {
            return Ok(());
        }
        if !record.status.can_transition_to(&status) {
            tracing::warn!(
                intent_id = %intent_id,
                from = %record.status,
                to = %status,
                "out-of-order webhook would regress status, ignoring"
            );
            return Ok(());
        }
        self.payments
            .update(intent_id, &PaymentUpdate::status(status))
            .await?;
        self.sink
            .record(
                NewLogEntry::new(
                    event_type,
                    "webhook",
                    serde_json::json!({ "gateway_intent_id": intent_id, "status": status.as_str() }),
                )
                .for_payment(record.id),
            )
            .await;
        Ok(())
    }

    async fn on_charge_succeeded(
        &self,
        intent_id: Option<&str>,
        charge: &ChargeSnapshot,
    ) -> Result<(), PaymentError> {
        let Some(intent_id) = intent_id else {
            return self
                .log_only(
                    "charge_succeeded",
                    serde_json::json!({ "charge_id": charge.charge_id }),
                )
                .await;
        };
        let Some(record) = self.payments.find_by_intent(intent_id).await? else {
            tracing::warn!(intent_id = %intent_id, "charge event with no local record");
            return Ok(());
        };
        let update = charge_update(Some(charge));
        if !update.is_empty() {
            self.payments.update(intent_id, &update).await?;
        }
        self.sink
            .record(
                NewLogEntry::new(
                    "charge_succeeded",
                    "webhook",
                    serde_json::json!({
                        "gateway_intent_id": intent_id,
                        "charge_id": charge.charge_id,
                        "risk_level": charge.risk_level,
                    }),
                )
                .for_payment(record.id),
            )
            .await;
        Ok(())
    }

    async fn on_charge_failed(
        &self,
        intent_id: Option<&str>,
        failure_code: Option<String>,
        failure_message: Option<String>,
    ) -> Result<(), PaymentError> {
        let Some(intent_id) = intent_id else {
            return self
                .log_only(
                    "charge_failed",
                    serde_json::json!({ "failure_code": failure_code }),
                )
                .await;
        };
        let Some(record) = self.payments.find_by_intent(intent_id).await? else {
            tracing::warn!(intent_id = %intent_id, "charge failure with no local record");
            return Ok(());
        };
        self.payments
            .update(
                intent_id,
                &PaymentUpdate {
                    failure_code: failure_code.clone(),
                    failure_message: failure_message.clone(),
                    ..PaymentUpdate::default()
                },
            )
            .await?;
        self.sink
            .record(
                NewLogEntry::new(
                    "charge_failed",
                    "webhook",
                    serde_json::json!({
                        "gateway_intent_id": intent_id,
                        "failure_code": failure_code,
                        "failure_message": failure_message,
                    }),
                )
                .for_payment(record.id),
            )
            .await;
        Ok(())
    }

    async fn on_charge_refunded(
        &self,
        intent_id: Option<&str>,
        amount_refunded: i64,
    ) -> Result<(), PaymentError> {
        let Some(intent_id) = intent_id else {
            return self
                .log_only(
                    "charge_refunded",
                    serde_json::json!({ "amount_refunded": amount_refunded }),
                )
                .await;
        };
        let Some(record) = self.payments.find_by_intent(intent_id).await? else {
            tracing::warn!(intent_id = %intent_id, "refund event with no local record");
            return Ok(());
        };
        // `amount_refunded` is cumulative. Only a full refund moves the
        // record to refunded; partials keep the current status.
        let fully_refunded = amount_refunded >= record.amount_minor()?.minor();
        if fully_refunded && record.status.can_transition_to(&PaymentStatus::Refunded) {
            self.payments
                .update(intent_id, &PaymentUpdate::status(PaymentStatus::Refunded))
                .await?;
        } else if !fully_refunded {
            tracing::info!(
                intent_id = %intent_id,
                amount_refunded,
                "partial refund recorded, status unchanged"
            );
        }
        self.sink
            .record(
                NewLogEntry::new(
                    "charge_refunded",
                    "webhook",
                    serde_json::json!({
                        "gateway_intent_id": intent_id,
                        "amount_refunded": amount_refunded,
                    }),
                )
                .for_payment(record.id),
            )
            .await;
        Ok(())
    }

    /// Chargebacks park the booking in `disputed`. Externally reversible,
    /// never auto-refunded.
    async fn on_dispute_created(
        &self,
        intent_id: Option<&str>,
        charge_id: Option<&str>,
        reason: Option<String>,
    ) -> Result<(), PaymentError> {
        let record = match intent_id {
            Some(id) => self.payments.find_by_intent(id).await?,
            None => None,
        };

        if let Some(record) = &record {
            self.bookings
                .set_status(&record.booking_id, BookingStatus::Disputed)
                .await?;
        } else {
            tracing::warn!(charge_id = ?charge_id, "dispute with no local payment correlation");
        }

        self.sink
            .record({
                let entry = NewLogEntry::new(
                    "dispute_created",
                    "webhook",
                    serde_json::json!({
                        "gateway_intent_id": intent_id,
                        "charge_id": charge_id,
                        "reason": reason,
                    }),
                );
                match &record {
                    Some(r) => entry.for_payment(r.id),
                    None => entry,
                }
            })
            .await;
        Ok(())
    }

    async fn log_only(
        &self,
        event_type: &str,
        detail: serde_json::Value,
    ) -> Result<(), PaymentError> {
        self.sink
            .record(NewLogEntry::new(event_type, "webhook", detail))
            .await;
        Ok(())
    }
}

fn charge_update(charge: Option<&ChargeSnapshot>) -> PaymentUpdate {
    let Some(charge) = charge else {
        return PaymentUpdate::default();
    };
    PaymentUpdate {
        charge_id: Some(charge.charge_id.clone()),
        receipt_url: charge.receipt_url.clone(),
        card_brand: charge.card_brand.clone(),
        card_last4: charge.card_last4.clone(),
        risk_level: charge.risk_level.clone(),
        risk_score: charge.risk_score,
        ..PaymentUpdate::default()
    }
}
