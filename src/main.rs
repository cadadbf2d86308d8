use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    coursepay::{
        AppState,
        adapters::{
            http, notify::LoggingNotifier, stripe_events::StripeEventDecoder,
            stripe_gateway::StripeGateway,
        },
        config::Config,
        infra::postgres::{
            audit_repo::PgAuditLog, booking_repo::PgBookingStore, lock::PgLockManager,
            payment_repo::PgPaymentStore, webhook_repo::PgWebhookStore,
        },
        services::{
            payments::{PaymentConfig, PaymentService},
            sink::EventSink,
            webhooks::WebhookEngine,
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::signal,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let payments_store = Arc::new(PgPaymentStore::new(pool.clone()));
    let bookings = Arc::new(PgBookingStore::new(pool.clone()));
    let events = Arc::new(PgWebhookStore::new(pool.clone()));
    let locks = Arc::new(PgLockManager::new(pool.clone()));
    let sink = Arc::new(EventSink::new(Arc::new(PgAuditLog::new(pool.clone()))));
    let notifier = Arc::new(LoggingNotifier);

    let gateway = Arc::new(StripeGateway::new(&config.stripe_secret_key));
    let decoder = Arc::new(StripeEventDecoder::new(config.stripe_webhook_secret.clone()));

    let payments = Arc::new(PaymentService::new(
        gateway,
        payments_store.clone(),
        bookings.clone(),
        notifier.clone(),
        locks,
        sink.clone(),
        PaymentConfig {
            currency: config.currency,
            statement_prefix: config.statement_prefix.clone(),
            retry: config.retry.clone(),
            ..PaymentConfig::default()
        },
    ));

    let webhooks = Arc::new(WebhookEngine::new(
        decoder,
        events,
        payments_store,
        bookings,
        notifier,
        sink.clone(),
        config.webhook_deadline,
    ));

    let state = AppState {
        payments,
        webhooks,
        sink,
    };

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/payments", post(http::create_payment_handler))
        .route(
            "/payments/{intent_id}/confirm",
            post(http::confirm_payment_handler),
        )
        .route("/refunds", post(http::create_refund_handler))
        .route("/webhook", post(http::webhook_handler))
        .route("/metrics", get(http::metrics_handler))
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB; Stripe events are typically <20 KB
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
