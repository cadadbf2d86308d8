//! Bounded-retry wrapper for outbound gateway calls. Sleeps are
//! `tokio::time::sleep`, so a retrying call for one payment never stalls
//! unrelated tasks.

use {crate::domain::gateway::GatewayError, std::future::Future, std::time::Duration};

#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2,
        }
    }
}

/// Run `op` up to `opts.max_attempts` times with exponential backoff.
/// Errors the gateway classified as final (card declined, invalid request,
/// bad credentials) re-raise immediately; only transient errors are
/// retried, and the last error is re-raised once attempts are exhausted.
pub async fn retry<T, F, Fut>(
    name: &str,
    opts: &RetryOptions,
    op: F,
) -> Result<T, GatewayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut delay = opts.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= opts.max_attempts => {
                tracing::warn!(
                    operation = name,
                    attempts = attempt,
                    error = %e,
                    "gateway call failed, attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient gateway error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * opts.backoff_multiplier).min(opts.max_delay);
                attempt += 1;
            }
        }
    }
}
