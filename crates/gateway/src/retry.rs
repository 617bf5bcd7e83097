use std::future::Future;

use switchboard_common::config::RetryConfig;
use switchboard_common::GatewayError;

/// Run `attempt` under the bounded retry policy.
///
/// Only transient error classes are retried; 429 honors `Retry-After` when
/// the upstream sent one. Streaming dispatches must not go through here —
/// the dispatcher performs them as single attempts.
pub async fn with_retries<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0u32;
    let mut backoff_ms = config.initial_backoff_ms;

    loop {
        attempt += 1;
        let result = attempt_fn().await;

        match result {
            Ok(value) => return Ok(value),
            Err(ref e) if !e.is_retryable() => return result,
            Err(GatewayError::RateLimited { retry_after }) => {
                if attempt >= config.max_attempts {
                    return Err(GatewayError::RateLimited { retry_after });
                }
                // Rate limits get the upstream's own delay, or a doubled
                // backoff as the longer initial delay.
                let wait = retry_after.map(|s| s * 1_000).unwrap_or(backoff_ms * 2);
                tracing::warn!(operation, attempt, wait_ms = wait, "Rate limited, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                backoff_ms = next_backoff(backoff_ms, config);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    return Err(e);
                }
                let jitter = if config.jitter {
                    compute_jitter(attempt, backoff_ms)
                } else {
                    0
                };
                let wait = backoff_ms + jitter;
                tracing::warn!(
                    operation,
                    attempt,
                    wait_ms = wait,
                    error = %e,
                    "Transient upstream error, retrying"
                );
                tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                backoff_ms = next_backoff(backoff_ms, config);
            }
        }
    }
}

fn next_backoff(current_ms: u64, config: &RetryConfig) -> u64 {
    ((current_ms as f64 * config.backoff_multiplier) as u64).min(config.max_backoff_ms)
}

/// Jitter in [0, backoff/4], hash-seeded from the attempt and wall clock.
fn compute_jitter(attempt: u32, backoff_ms: u64) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    hasher.finish() % (backoff_ms / 4 + 1)
}
