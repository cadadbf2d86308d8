//! Thin HTTP layer: extract, delegate to the services, map the outcome.

use {
    super::api_errors::ApiError,
    crate::{
        AppState,
        domain::{
            booking::Booking,
            gateway::RefundSnapshot,
            payment::{PaymentRecord, PaymentStatus},
        },
        services::{
            payments::{ConfirmOutcome, CreatePaymentRequest, CreateRefundRequest, CreatedIntent, RequestMeta},
            sink::MetricsSnapshot,
            webhooks::WebhookAck,
        },
    },
    axum::{
        Json,
        extract::{Path, State},
        http::HeaderMap,
    },
    serde::Serialize,
};

pub async fn create_payment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatedIntent>, ApiError> {
    let meta = request_meta(&headers);
    let created = state.payments.create_payment_intent(&request, &meta).await?;
    Ok(Json(created))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Box<PaymentRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_action: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConfirmResponse {
    fn incomplete(status: PaymentStatus) -> Self {
        Self {
            success: false,
            payment: None,
            booking: None,
            requires_action: false,
            action_url: None,
            status: Some(status),
            message: None,
        }
    }
}

pub async fn confirm_payment_handler(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let response = match state.payments.confirm_payment(&intent_id).await? {
        ConfirmOutcome::Succeeded { payment, booking } => ConfirmResponse {
            success: true,
            payment: Some(payment),
            booking: Some(booking),
            requires_action: false,
            action_url: None,
            status: Some(PaymentStatus::Succeeded),
            message: None,
        },
        ConfirmOutcome::RequiresAction { action_url } => ConfirmResponse {
            requires_action: true,
            action_url,
            ..ConfirmResponse::incomplete(PaymentStatus::RequiresAction)
        },
        ConfirmOutcome::Processing => ConfirmResponse::incomplete(PaymentStatus::Processing),
        ConfirmOutcome::Incomplete { status } => ConfirmResponse::incomplete(status),
        ConfirmOutcome::Failed { message } => ConfirmResponse {
            message: Some(message),
            ..ConfirmResponse::incomplete(PaymentStatus::Failed)
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub refund_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub amount: String,
}

impl From<RefundSnapshot> for RefundResponse {
    fn from(snapshot: RefundSnapshot) -> Self {
        Self {
            refund_id: snapshot.refund_id,
            status: snapshot.status,
            amount: format!(
                "{}.{:02}",
                snapshot.amount_minor / 100,
                snapshot.amount_minor % 100
            ),
        }
    }
}

pub async fn create_refund_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateRefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let refund = state.payments.create_refund(&request).await?;
    Ok(Json(RefundResponse::from(refund)))
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());

    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let ack = state
        .webhooks
        .handle_webhook(signature, &body, &header_pairs)
        .await?;
    Ok(Json(ack))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.sink.snapshot())
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    RequestMeta { ip, user_agent }
}
