use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rolling-window rate limiter: at most `max_calls` admissions in any
/// `window`-long interval.
///
/// Keeps a log of admission instants. A caller that finds the log full sleeps
/// until the oldest entry leaves the window and then competes again, so
/// admission order between waiting callers is best effort.
///
/// One limiter is shared (behind an `Arc`) by every worker of a fetch.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_calls` below 1 is treated as 1
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until one more call fits in the window, then records it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();

                while let Some(oldest) = admitted.front() {
                    if now.duration_since(*oldest) >= self.window {
                        admitted.pop_front();
                    } else {
                        break;
                    }
                }

                if admitted.len() < self.max_calls {
                    admitted.push_back(now);
                    return;
                }

                match admitted.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}
