//! Stripe implementation of the payment gateway port.
//!
//! Every mutating call is sent with an explicit idempotency key, so the
//! retry loop upstream can safely replay a request that timed out after
//! reaching Stripe.

use {
    crate::domain::{
        gateway::{
            ChargeSnapshot, CreateIntentRequest, GatewayError, IntentSnapshot, PaymentGateway,
            RefundReason, RefundRequest, RefundSnapshot,
        },
        money::Currency,
        payment::PaymentStatus,
    },
    async_trait::async_trait,
};

pub struct StripeGateway {
    client: stripe::Client,
}

impl StripeGateway {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }

    fn idempotent_client(&self, key: &str) -> stripe::Client {
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<IntentSnapshot, GatewayError> {
        let client = self.idempotent_client(&request.idempotency_key);

        let mut params =
            stripe::CreatePaymentIntent::new(request.amount.minor(), to_stripe_currency(request.currency));
        params.receipt_email = Some(&request.receipt_email);
        params.statement_descriptor = request.statement_descriptor.as_deref();
        if !request.metadata.is_empty() {
            params.metadata = Some(request.metadata.clone());
        }

        let pi = stripe::PaymentIntent::create(&client, params)
            .await
            .map_err(map_stripe_error)?;
        Ok(snapshot_from_pi(&pi))
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentSnapshot, GatewayError> {
        let pi_id = intent_id
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| GatewayError::Transport(format!("invalid PaymentIntent id: {e}")))?;
        let pi = stripe::PaymentIntent::retrieve(&self.client, &pi_id, &["latest_charge"])
            .await
            .map_err(map_stripe_error)?;
        Ok(snapshot_from_pi(&pi))
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<RefundSnapshot, GatewayError> {
        let client = self.idempotent_client(&request.idempotency_key);

        let pi_id = request
            .intent_id
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| GatewayError::Transport(format!("invalid PaymentIntent id: {e}")))?;

        let mut params = stripe::CreateRefund::new();
        params.payment_intent = Some(pi_id);
        params.amount = request.amount.map(|a| a.minor());
        params.reason = request.reason.map(|r| match r {
            RefundReason::Duplicate => stripe::RefundReasonFilter::Duplicate,
            RefundReason::Fraudulent => stripe::RefundReasonFilter::Fraudulent,
            RefundReason::RequestedByCustomer => stripe::RefundReasonFilter::RequestedByCustomer,
        });

        let refund = stripe::Refund::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(RefundSnapshot {
            refund_id: refund.id.to_string(),
            status: refund.status.map(|s| s.to_string()),
            amount_minor: refund.amount,
        })
    }
}

fn to_stripe_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
    }
}

fn convert_pi_status(status: stripe::PaymentIntentStatus) -> PaymentStatus {
    #[allow(unreachable_patterns)]
    match status {
        stripe::PaymentIntentStatus::Succeeded => PaymentStatus::Succeeded,
        stripe::PaymentIntentStatus::Canceled => PaymentStatus::Canceled,
        stripe::PaymentIntentStatus::Processing => PaymentStatus::Processing,
        stripe::PaymentIntentStatus::RequiresAction
        | stripe::PaymentIntentStatus::RequiresCapture => PaymentStatus::RequiresAction,
        stripe::PaymentIntentStatus::RequiresConfirmation => PaymentStatus::RequiresConfirmation,
        stripe::PaymentIntentStatus::RequiresPaymentMethod => PaymentStatus::RequiresPaymentMethod,
        other => {
            tracing::warn!("unknown PaymentIntentStatus: {other:?}, treating as processing");
            PaymentStatus::Processing
        }
    }
}

pub(crate) fn snapshot_from_pi(pi: &stripe::PaymentIntent) -> IntentSnapshot {
    let charge = pi.latest_charge.as_ref().and_then(|c| match c {
        stripe::Expandable::Id(id) => Some(ChargeSnapshot {
            charge_id: id.to_string(),
            ..ChargeSnapshot::default()
        }),
        stripe::Expandable::Object(charge) => Some(snapshot_from_charge(charge)),
    });

    let next_action_url = pi
        .next_action
        .as_ref()
        .and_then(|a| a.redirect_to_url.as_ref())
        .and_then(|r| r.url.clone());

    let (last_error_code, last_error_message) = match pi.last_payment_error.as_ref() {
        Some(e) => (
            e.code.as_ref().map(|c| format!("{c:?}")),
            e.message.clone(),
        ),
        None => (None, None),
    };

    IntentSnapshot {
        intent_id: pi.id.to_string(),
        client_secret: pi.client_secret.clone(),
        status: convert_pi_status(pi.status),
        amount_minor: pi.amount,
        charge,
        next_action_url,
        last_error_code,
        last_error_message,
    }
}

pub(crate) fn snapshot_from_charge(charge: &stripe::Charge) -> ChargeSnapshot {
    let card = charge
        .payment_method_details
        .as_ref()
        .and_then(|d| d.card.as_ref());
    ChargeSnapshot {
        charge_id: charge.id.to_string(),
        receipt_url: charge.receipt_url.clone(),
        card_brand: card.and_then(|c| c.brand.clone()),
        card_last4: card.and_then(|c| c.last4.clone()),
        risk_level: charge.outcome.as_ref().and_then(|o| o.risk_level.clone()),
        risk_score: charge.outcome.as_ref().and_then(|o| o.risk_score),
    }
}

fn map_stripe_error(error: stripe::StripeError) -> GatewayError {
    match error {
        stripe::StripeError::Stripe(request_error) => GatewayError::Rejected {
            http_status: request_error.http_status,
            code: request_error.code.as_ref().map(|c| format!("{c:?}")),
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| "unknown gateway error".to_string()),
        },
        stripe::StripeError::Timeout => GatewayError::Timeout,
        other => GatewayError::Transport(other.to_string()),
    }
}
