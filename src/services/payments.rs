//! Payment intent lifecycle: creation, confirmation, refunds. All gateway
//! calls go through the retry executor; duplicate-charge protection is the
//! local succeeded-payment check backed by the storage constraint.

use {
    super::{idempotency::idempotency_key, retry::RetryOptions, retry::retry, sink::EventSink},
    crate::domain::{
        audit::NewLogEntry,
        booking::{Booking, BookingStatus},
        error::PaymentError,
        gateway::{CreateIntentRequest, PaymentGateway, RefundRequest, RefundSnapshot},
        money::{Currency, MoneyAmount},
        payment::{NewPaymentRecord, PaymentRecord, PaymentStatus, PaymentUpdate},
        ports::{BookingStore, LockManager, Notifier, PaymentStore},
        validate::{sanitize_statement_descriptor, validate_create_request},
    },
    serde::Deserialize,
    std::collections::HashMap,
    std::sync::Arc,
    std::time::Duration,
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub currency: Currency,
    /// Prefix for card statement descriptors, combined with the booking
    /// reference and sanitized to the gateway's 22-char alphabet.
    pub statement_prefix: String,
    pub retry: RetryOptions,
    /// TTL for the cross-instance locks around creation and confirmation.
    pub lock_ttl: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Gbp,
            statement_prefix: "COURSE BOOKING".to_string(),
            retry: RetryOptions::default(),
            lock_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: f64,
    pub booking_id: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
}

/// Request metadata carried into audit entries only.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub amount: String,
    pub currency: Currency,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_action: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Succeeded {
        payment: Box<PaymentRecord>,
        booking: Booking,
    },
    RequiresAction {
        action_url: Option<String>,
    },
    /// The gateway is still settling; poll or wait for the webhook.
    Processing,
    /// Not yet confirmable (no payment method attached, or awaiting
    /// client confirmation).
    Incomplete {
        status: PaymentStatus,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub payment_intent_id: String,
    /// Major units; absent means refund the full remaining balance.
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<dyn LockManager>,
    sink: Arc<EventSink>,
    config: PaymentConfig,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentStore>,
        bookings: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<dyn LockManager>,
        sink: Arc<EventSink>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            gateway,
            payments,
            bookings,
            notifier,
            locks,
            sink,
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(booking_id = %request.booking_id))]
    pub async fn create_payment_intent(
        &self,
        request: &CreatePaymentRequest,
        meta: &RequestMeta,
    ) -> Result<CreatedIntent, PaymentError> {
        let amount = validate_create_request(
            request.amount,
            &request.booking_id,
            &request.customer_email,
        )?;

        // One creation attempt per booking at a time, across instances.
        let lock_name = format!("payment:create:{}", request.booking_id);
        let token = self
            .locks
            .try_acquire(&lock_name, self.config.lock_ttl)
            .await?
            .ok_or_else(|| PaymentError::PaymentInFlight(request.booking_id.clone()))?;

        let result = self.create_locked(request, meta, amount).await;

        if let Err(e) = self.locks.release(&lock_name, &token).await {
            tracing::warn!(lock = %lock_name, error = %e, "lock release failed, will expire by TTL");
        }
        result
    }

    async fn create_locked(
        &self,
        request: &CreatePaymentRequest,
        meta: &RequestMeta,
        amount: MoneyAmount,
    ) -> Result<CreatedIntent, PaymentError> {
        let booking = self
            .bookings
            .get_for_update(&request.booking_id)
            .await?
            .ok_or_else(|| PaymentError::BookingNotFound(request.booking_id.clone()))?;

        if self.payments.has_succeeded(&booking.id).await? {
            return Err(PaymentError::DuplicatePayment(booking.id));
        }

        let key = idempotency_key(&booking.id);
        let descriptor = sanitize_statement_descriptor(&format!(
            "{} {}",
            self.config.statement_prefix, booking.reference
        ));

        let gateway_request = CreateIntentRequest {
            amount,
            currency: self.config.currency,
            idempotency_key: key.clone(),
            receipt_email: request.customer_email.clone(),
            statement_descriptor: Some(descriptor),
            metadata: HashMap::from([
                ("booking_id".to_string(), booking.id.clone()),
                ("booking_reference".to_string(), booking.reference.clone()),
            ]),
        };

        let snapshot = retry("create_intent", &self.config.retry, || {
            self.gateway.create_intent(&gateway_request)
        })
        .await
        .map_err(PaymentError::PaymentCreationFailed)?;

        if snapshot.amount_minor != amount.minor() {
            tracing::warn!(
                intent_id = %snapshot.intent_id,
                requested = amount.minor(),
                reported = snapshot.amount_minor,
                "gateway reported a different amount for the created intent"
            );
        }

        let record = NewPaymentRecord {
            id: Uuid::now_v7(),
            booking_id: booking.id.clone(),
            gateway_intent_id: snapshot.intent_id.clone(),
            idempotency_key: key,
            amount,
            currency: self.config.currency,
            status: snapshot.status,
            customer_email: request.customer_email.clone(),
            customer_name: request.customer_name.clone(),
        };
        self.payments.insert(&record).await?;
        self.bookings
            .set_payment_intent(&booking.id, &snapshot.intent_id)
            .await?;

        self.sink.intent_created();
        self.sink
            .record(
                NewLogEntry::new(
                    "payment_created",
                    "api",
                    serde_json::json!({
                        "booking_id": booking.id,
                        "gateway_intent_id": snapshot.intent_id,
                        "amount": amount.to_major_string(),
                        "currency": self.config.currency.as_str(),
                        "status": snapshot.status.as_str(),
                    }),
                )
                .for_payment(record.id)
                .with_request_meta(meta.ip.clone(), meta.user_agent.clone()),
            )
            .await;

        Ok(CreatedIntent {
            client_secret: snapshot.client_secret,
            payment_intent_id: snapshot.intent_id,
            amount: amount.to_major_string(),
            currency: self.config.currency,
            status: snapshot.status,
            requires_action: snapshot.status == PaymentStatus::RequiresAction,
            action_url: snapshot.next_action_url,
        })
    }

    /// Pull the gateway's view of the intent, fold it into the local
    /// record, and derive the caller-facing outcome. Runs under a
    /// short-TTL lock because it touches payment and booking rows.
    #[tracing::instrument(skip_all, fields(intent_id = %intent_id))]
    pub async fn confirm_payment(&self, intent_id: &str) -> Result<ConfirmOutcome, PaymentError> {
        let lock_name = format!("payment:confirm:{intent_id}");
        let Some(token) = self
            .locks
            .try_acquire(&lock_name, self.config.lock_ttl)
            .await?
        else {
            // Another worker is mid-confirmation; report non-terminal.
            return Ok(ConfirmOutcome::Processing);
        };

        let result = self.confirm_locked(intent_id).await;

        if let Err(e) = self.locks.release(&lock_name, &token).await {
            tracing::warn!(lock = %lock_name, error = %e, "lock release failed, will expire by TTL");
        }
        result
    }

    async fn confirm_locked(&self, intent_id: &str) -> Result<ConfirmOutcome, PaymentError> {
        let snapshot = retry("retrieve_intent", &self.config.retry, || {
            self.gateway.retrieve_intent(intent_id)
        })
        .await
        .map_err(PaymentError::ConfirmationFailed)?;

        let record = self
            .payments
            .find_by_intent(&snapshot.intent_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(intent_id.to_string()))?;

        let mut update = PaymentUpdate {
            charge_id: snapshot.charge.as_ref().map(|c| c.charge_id.clone()),
            receipt_url: snapshot.charge.as_ref().and_then(|c| c.receipt_url.clone()),
            card_brand: snapshot.charge.as_ref().and_then(|c| c.card_brand.clone()),
            card_last4: snapshot.charge.as_ref().and_then(|c| c.card_last4.clone()),
            risk_level: snapshot.charge.as_ref().and_then(|c| c.risk_level.clone()),
            risk_score: snapshot.charge.as_ref().and_then(|c| c.risk_score),
            failure_code: snapshot.last_error_code.clone(),
            failure_message: snapshot.last_error_message.clone(),
            ..PaymentUpdate::default()
        };
        if record.status != snapshot.status {
            if record.status.can_transition_to(&snapshot.status) {
                update.status = Some(snapshot.status);
            } else {
                tracing::warn!(
                    from = %record.status,
                    to = %snapshot.status,
                    "gateway reported a status the ledger cannot move to, keeping local status"
                );
            }
        }
        self.payments.update(&snapshot.intent_id, &update).await?;

        match snapshot.status {
            PaymentStatus::Succeeded => {
                self.bookings
                    .set_status(&record.booking_id, BookingStatus::Confirmed)
                    .await?;
                self.sink.intent_succeeded();
                self.sink
                    .record(
                        NewLogEntry::new(
                            "payment_success",
                            "api",
                            serde_json::json!({
                                "booking_id": record.booking_id,
                                "gateway_intent_id": snapshot.intent_id,
                                "risk_level": update.risk_level,
                            }),
                        )
                        .for_payment(record.id),
                    )
                    .await;
                self.notify_success(&record.booking_id, &record.customer_email);

                let payment = self
                    .payments
                    .find_by_intent(&snapshot.intent_id)
                    .await?
                    .ok_or_else(|| PaymentError::PaymentNotFound(intent_id.to_string()))?;
                let booking = self
                    .bookings
                    .get_for_update(&record.booking_id)
                    .await?
                    .ok_or_else(|| PaymentError::BookingNotFound(record.booking_id.clone()))?;
                Ok(ConfirmOutcome::Succeeded {
                    payment: Box::new(payment),
                    booking,
                })
            }
            PaymentStatus::RequiresAction => {
                self.sink
                    .record(
                        NewLogEntry::new(
                            "payment_requires_action",
                            "api",
                            serde_json::json!({
                                "gateway_intent_id": snapshot.intent_id,
                                "action_url": snapshot.next_action_url,
                            }),
                        )
                        .for_payment(record.id),
                    )
                    .await;
                Ok(ConfirmOutcome::RequiresAction {
                    action_url: snapshot.next_action_url,
                })
            }
            PaymentStatus::Processing => Ok(ConfirmOutcome::Processing),
            PaymentStatus::RequiresPaymentMethod | PaymentStatus::RequiresConfirmation => {
                Ok(ConfirmOutcome::Incomplete {
                    status: snapshot.status,
                })
            }
            _ => {
                self.sink.intent_failed();
                let message = snapshot
                    .last_error_message
                    .unwrap_or_else(|| "payment failed".to_string());
                self.sink
                    .record(
                        NewLogEntry::new(
                            "payment_failed",
                            "api",
                            serde_json::json!({
                                "gateway_intent_id": snapshot.intent_id,
                                "failure_code": update.failure_code,
                                "failure_message": message,
                            }),
                        )
                        .for_payment(record.id),
                    )
                    .await;
                Ok(ConfirmOutcome::Failed { message })
            }
        }
    }

    #[tracing::instrument(skip_all, fields(intent_id = %request.payment_intent_id))]
    pub async fn create_refund(
        &self,
        request: &CreateRefundRequest,
    ) -> Result<RefundSnapshot, PaymentError> {
        let snapshot = retry("retrieve_intent", &self.config.retry, || {
            self.gateway.retrieve_intent(&request.payment_intent_id)
        })
        .await
        .map_err(PaymentError::RefundFailed)?;

        let record = self
            .payments
            .find_by_intent(&snapshot.intent_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(request.payment_intent_id.clone()))?;

        if snapshot.status != PaymentStatus::Succeeded {
            return Err(PaymentError::PaymentNotRefundable(
                snapshot.status.as_str().to_string(),
            ));
        }

        // All amount checks happen before any money-moving call. The cap
        // is what this ledger charged, recomputed from the stored record.
        let charged = record.amount_minor()?;
        let amount = match request.amount {
            Some(major) => {
                if major <= 0.0 {
                    return Err(PaymentError::InvalidRefundAmount);
                }
                let minor = MoneyAmount::from_major(major)?;
                if minor.minor() > charged.minor() {
                    return Err(PaymentError::RefundExceedsPayment {
                        requested: minor.minor(),
                        charged: charged.minor(),
                    });
                }
                Some(minor)
            }
            None => None,
        };

        let gateway_request = RefundRequest {
            intent_id: snapshot.intent_id.clone(),
            amount,
            reason: request
                .reason
                .as_deref()
                .and_then(crate::domain::gateway::RefundReason::parse),
            idempotency_key: idempotency_key(&record.booking_id),
        };

        let refund = retry("create_refund", &self.config.retry, || {
            self.gateway.create_refund(&gateway_request)
        })
        .await
        .map_err(PaymentError::RefundFailed)?;

        if refund.status.as_deref() == Some("succeeded") {
            self.payments
                .update(
                    &snapshot.intent_id,
                    &PaymentUpdate::status(PaymentStatus::Refunded),
                )
                .await?;
        }

        self.sink
            .record(
                NewLogEntry::new(
                    "refund_created",
                    "api",
                    serde_json::json!({
                        "gateway_intent_id": snapshot.intent_id,
                        "refund_id": refund.refund_id,
                        "amount_minor": refund.amount_minor,
                        "status": refund.status,
                        "reason": request.reason,
                    }),
                )
                .for_payment(record.id),
            )
            .await;

        Ok(refund)
    }

    /// Fire-and-forget: notification failures never fail the payment.
    fn notify_success(&self, booking_id: &str, email: &str) {
        let notifier = Arc::clone(&self.notifier);
        let booking_id = booking_id.to_string();
        let email = email.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.payment_succeeded(&booking_id, &email).await {
                tracing::warn!(booking_id = %booking_id, error = %e, "success notification failed");
            }
        });
    }
}
