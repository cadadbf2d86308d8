//! Signature verification and decoding of Stripe webhook deliveries into
//! the engine's event taxonomy.

use {
    super::stripe_gateway::{snapshot_from_charge, snapshot_from_pi},
    crate::domain::{
        error::PaymentError,
        ports::EventDecoder,
        webhook::{DecodedEvent, WebhookEventKind},
    },
};

pub struct StripeEventDecoder {
    webhook_secret: String,
}

impl StripeEventDecoder {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }
}

impl EventDecoder for StripeEventDecoder {
    fn decode(&self, payload: &str, signature: &str) -> Result<DecodedEvent, PaymentError> {
        let event = stripe::Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| PaymentError::WebhookSignatureInvalid(e.to_string()))?;

        let raw: serde_json::Value = serde_json::from_str(payload)?;
        // The typed enum lags the live API; the raw "type" string is
        // authoritative for what we persist and dispatch on.
        let event_type = raw
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let kind = decode_kind(&event_type, &event, &raw);

        Ok(DecodedEvent {
            event_id: event.id.to_string(),
            event_type,
            kind,
            raw,
        })
    }
}

fn decode_kind(
    event_type: &str,
    event: &stripe::Event,
    raw: &serde_json::Value,
) -> WebhookEventKind {
    match (event_type, &event.data.object) {
        ("payment_intent.succeeded", stripe::EventObject::PaymentIntent(pi)) => {
            WebhookEventKind::IntentSucceeded {
                intent: snapshot_from_pi(pi),
            }
        }
        ("payment_intent.payment_failed", stripe::EventObject::PaymentIntent(pi)) => {
            WebhookEventKind::IntentFailed {
                intent: snapshot_from_pi(pi),
            }
        }
        ("payment_intent.processing", stripe::EventObject::PaymentIntent(pi)) => {
            WebhookEventKind::IntentProcessing {
                intent_id: pi.id.to_string(),
            }
        }
        ("payment_intent.requires_action", stripe::EventObject::PaymentIntent(pi)) => {
            let snapshot = snapshot_from_pi(pi);
            WebhookEventKind::IntentRequiresAction {
                intent_id: snapshot.intent_id,
                action_url: snapshot.next_action_url,
            }
        }
        ("charge.succeeded", stripe::EventObject::Charge(charge)) => {
            WebhookEventKind::ChargeSucceeded {
                intent_id: charge_intent_id(charge),
                charge: snapshot_from_charge(charge),
            }
        }
        ("charge.failed", stripe::EventObject::Charge(charge)) => WebhookEventKind::ChargeFailed {
            intent_id: charge_intent_id(charge),
            failure_code: charge.failure_code.clone(),
            failure_message: charge.failure_message.clone(),
        },
        ("charge.refunded", stripe::EventObject::Charge(charge)) => {
            WebhookEventKind::ChargeRefunded {
                intent_id: charge_intent_id(charge),
                amount_refunded: charge.amount_refunded,
            }
        }
        // Dispute and fraud-warning payloads are read from the raw JSON;
        // only the correlation ids matter to the handlers.
        ("charge.dispute.created", _) => WebhookEventKind::DisputeCreated {
            intent_id: object_str(raw, "payment_intent"),
            charge_id: object_str(raw, "charge"),
            reason: object_str(raw, "reason"),
        },
        ("radar.early_fraud_warning.created", _) => WebhookEventKind::EarlyFraudWarning {
            charge_id: object_str(raw, "charge"),
        },
        ("payment_method.attached", stripe::EventObject::PaymentMethod(pm)) => {
            WebhookEventKind::PaymentMethodAttached {
                payment_method_id: pm.id.to_string(),
            }
        }
        ("payment_method.detached", stripe::EventObject::PaymentMethod(pm)) => {
            WebhookEventKind::PaymentMethodDetached {
                payment_method_id: pm.id.to_string(),
            }
        }
        ("customer.created", stripe::EventObject::Customer(c)) => WebhookEventKind::CustomerCreated {
            customer_id: c.id.to_string(),
            email: c.email.clone(),
        },
        ("customer.updated", stripe::EventObject::Customer(c)) => WebhookEventKind::CustomerUpdated {
            customer_id: c.id.to_string(),
            email: c.email.clone(),
        },
        _ => WebhookEventKind::Unrecognized,
    }
}

fn charge_intent_id(charge: &stripe::Charge) -> Option<String> {
    charge.payment_intent.as_ref().map(|e| match e {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(pi) => pi.id.to_string(),
    })
}

/// String field of `data.object` in the raw event payload.
fn object_str(raw: &serde_json::Value, field: &str) -> Option<String> {
    raw.pointer(&format!("/data/object/{field}"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
