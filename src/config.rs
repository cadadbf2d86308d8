use {
    crate::{domain::money::Currency, services::retry::RetryOptions},
    std::{env, time::Duration},
};

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub currency: Currency,
    pub bind_addr: String,
    pub retry: RetryOptions,
    pub webhook_deadline: Duration,
    pub statement_prefix: String,
}

impl Config {
    /// Panics on missing required variables; a half-configured payment
    /// service must not start.
    pub fn from_env() -> Self {
        let currency = env::var("CURRENCY")
            .ok()
            .map(|s| Currency::try_from(s.as_str()).expect("CURRENCY must be gbp, usd or eur"))
            .unwrap_or(Currency::Gbp);

        let retry = RetryOptions {
            max_attempts: env_parse("GATEWAY_RETRY_MAX_ATTEMPTS", 3),
            initial_delay: Duration::from_millis(env_parse("GATEWAY_RETRY_INITIAL_DELAY_MS", 1000)),
            max_delay: Duration::from_millis(env_parse("GATEWAY_RETRY_MAX_DELAY_MS", 10_000)),
            backoff_multiplier: env_parse("GATEWAY_RETRY_BACKOFF_MULTIPLIER", 2),
        };

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            currency,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            retry,
            webhook_deadline: Duration::from_secs(env_parse("WEBHOOK_DEADLINE_SECS", 25)),
            statement_prefix: env::var("STATEMENT_PREFIX")
                .unwrap_or_else(|_| "COURSE BOOKING".to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number")),
        Err(_) => default,
    }
}
