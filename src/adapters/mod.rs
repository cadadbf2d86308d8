pub mod api_errors;
pub mod http;
pub mod notify;
pub mod stripe_events;
pub mod stripe_gateway;
