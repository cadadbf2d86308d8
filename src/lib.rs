pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    crate::services::{payments::PaymentService, sink::EventSink, webhooks::WebhookEngine},
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookEngine>,
    pub sink: Arc<EventSink>,
}
