//! Application services: fetch engine, write queue and status tracking

mod paginated_fetcher;
mod rate_limiter;
mod retry;
mod source_status_tracker;
mod upsert_queue;

pub use paginated_fetcher::{FetchSummary, PaginatedFetcher, DEFAULT_MAX_THREADS};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy, DEFAULT_RETRYABLE_STATUSES};
pub use source_status_tracker::SourceStatusTracker;
pub use upsert_queue::{QueueStats, UpsertQueue};
