use crate::config::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Delay before the next attempt: exponential in `attempt`, with jitter up to
/// `base_ms`, capped at `max_ms`.
pub fn next_retry_delay(attempt: usize, base_ms: u64, max_ms: u64) -> Duration {
    let multiplier = 2_u64.saturating_pow(attempt as u32);
    let delay = base_ms.saturating_mul(multiplier);
    let jitter = rand::random::<u64>() % base_ms.max(1);
    let total = delay.saturating_add(jitter);
    Duration::from_millis(total.min(max_ms))
}

/// Run `operation` until it succeeds or `settings.max_attempts` is reached.
/// A `max_attempts` of zero still runs the operation once.
pub async fn retry_async<T, E, F, Fut>(
    operation_name: &str,
    settings: RetrySettings,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = settings.max_attempts.max(1) as usize;
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    if max_attempts > 1 {
                        error!(
                            "Failed to execute '{}' after {} attempts: {}",
                            operation_name, max_attempts, e
                        );
                    }
                    return Err(e);
                }
                let delay =
                    next_retry_delay(attempt, settings.base_delay_ms, settings.max_delay_ms);
                warn!(
                    "Operation '{}' failed. Retrying in {:?} (Attempt {}/{}): {}",
                    operation_name, delay, attempt, max_attempts, e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
