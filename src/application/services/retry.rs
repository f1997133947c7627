use crate::shared::error::FetchError;
use std::future::Future;
use std::time::Duration;

/// Statuses an upstream uses to signal rate limiting or backpressure
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 2] = [403, 503];

/// Fixed-delay retry policy for transient upstream failures.
///
/// `retry_limit` is the number of retries after the first attempt, so an
/// operation runs at most `retry_limit + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub retry_delay: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, retry_delay: Duration) -> Self {
        Self {
            retry_limit,
            retry_delay,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

/// Runs `operation` until it succeeds, fails fatally, or runs out of retries
///
/// The closure receives the 1-based attempt number. Transient errors (see
/// [`FetchError::is_transient`]) sleep `retry_delay` and try again; any other
/// error is returned immediately. Once retries are exhausted the last
/// transient error is wrapped in [`FetchError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient(&policy.retryable_statuses) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        target_url = %target,
                        attempt,
                        error = %err,
                        "Transient failure, retries exhausted"
                    );
                    return Err(FetchError::RetriesExhausted {
                        url: target.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                tracing::warn!(
                    target_url = %target,
                    attempt,
                    retry_in_secs = policy.retry_delay.as_secs(),
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
