use chrono::{DateTime, Utc};
use std::time::Duration;

/// Delay before the next job: `max(0, interval - elapsed_since_last_success)`.
///
/// No recorded success means run now. A last-success timestamp in the future
/// (clock moved backwards) is treated as "just ran".
pub fn next_run_delay(
    last_success: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last_success) = last_success else {
        return Duration::ZERO;
    };

    let elapsed = (now - last_success).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}
