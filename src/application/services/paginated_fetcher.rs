use super::rate_limiter::RateLimiter;
use super::retry::{with_retry, RetryPolicy};
use crate::application::dto::{FetchRequest, PageLayout};
use crate::ingestion::services::PagePlan;
use crate::ports::outbound::PageClient;
use crate::shared::error::FetchError;
use crate::shared::Result;
use anyhow::Context;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Default size of the page worker pool
pub const DEFAULT_MAX_THREADS: usize = 10;

/// One decoded page
#[derive(Debug)]
struct Page {
    total_results: u64,
    page_size: u64,
    records: Vec<Value>,
}

/// Aggregate counts of a completed fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: u64,
    pub records: usize,
    pub total_results: u64,
}

/// PaginatedFetcher drives an index-paginated listing endpoint.
///
/// The first page is fetched alone to learn `totalResults` and the page size
/// the server honours; the remaining pages run on up to `max_threads`
/// concurrent requests. Every request, including retries, passes through the
/// shared [`RateLimiter`], so the outbound rate is capped regardless of the
/// pool size.
///
/// The total is read once. If it changes mid-fetch, later pages can overlap
/// or miss records; this inconsistency window is accepted.
pub struct PaginatedFetcher {
    client: Arc<dyn PageClient>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_threads: usize,
}

impl PaginatedFetcher {
    pub fn new(
        client: Arc<dyn PageClient>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        max_threads: usize,
    ) -> Self {
        Self {
            client,
            limiter,
            retry,
            max_threads: max_threads.max(1),
        }
    }

    /// Fetches every page and hands each page's records to `on_page`
    ///
    /// `on_page` may run for several pages concurrently and in any order.
    ///
    /// # Errors
    /// A fatal status, a malformed body, exhausted retries on any page, or an
    /// error from `on_page` fails the whole fetch. In-flight pages are still
    /// drained before the first error is returned.
    pub async fn fetch_all<F>(&self, request: &FetchRequest, on_page: F) -> Result<FetchSummary>
    where
        F: Fn(Vec<Value>) -> Result<()> + Send + Sync,
    {
        let first = self
            .fetch_page(request, 0)
            .await
            .context("Failed to fetch first page")?;

        let plan =
            PagePlan::from_first_page(first.total_results, first.page_size, request.page_size);
        tracing::info!(
            url = %request.url,
            total_results = plan.total_results(),
            page_size = plan.page_size(),
            pages = plan.page_count(),
            "Starting paginated fetch"
        );

        let mut summary = FetchSummary {
            pages: 1,
            records: first.records.len(),
            total_results: plan.total_results(),
        };
        on_page(first.records)?;

        let on_page = &on_page;
        let results: Vec<(u64, Result<usize>)> = stream::iter(plan.remaining_start_indexes())
            .map(|start_index| async move {
                let outcome = async {
                    let page = self.fetch_page(request, start_index).await?;
                    let count = page.records.len();
                    on_page(page.records)?;
                    Ok::<usize, anyhow::Error>(count)
                }
                .await;
                (start_index, outcome)
            })
            .buffer_unordered(self.max_threads)
            .collect()
            .await;

        let mut first_error = None;
        for (start_index, outcome) in results {
            match outcome {
                Ok(count) => {
                    summary.pages += 1;
                    summary.records += count;
                }
                Err(err) => {
                    tracing::error!(
                        url = %request.url,
                        start_index,
                        error = %format!("{:#}", err),
                        "Page fetch failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(
                            err.context(format!("Failed to fetch page at index {}", start_index)),
                        );
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        tracing::info!(
            url = %request.url,
            pages = summary.pages,
            records = summary.records,
            "Paginated fetch complete"
        );
        Ok(summary)
    }

    async fn fetch_page(
        &self,
        request: &FetchRequest,
        start_index: u64,
    ) -> std::result::Result<Page, FetchError> {
        let page_request = request.page(start_index);
        let url_with_query = page_request.url_with_query();

        with_retry(&self.retry, &url_with_query, |attempt| {
            let page_request = &page_request;
            let url_with_query = &url_with_query;
            async move {
                self.limiter.acquire().await;
                tracing::debug!(url = %url_with_query, attempt, "Requesting page");

                let response = self.client.get(page_request).await?;
                if !response.is_success() {
                    return Err(FetchError::Status {
                        status: response.status,
                        url: url_with_query.clone(),
                    });
                }
                parse_page(&response.body, &request.layout, url_with_query)
            }
        })
        .await
    }
}

fn parse_page(
    body: &[u8],
    layout: &PageLayout,
    url: &str,
) -> std::result::Result<Page, FetchError> {
    let parse_error = |details: String| FetchError::Parse {
        url: url.to_string(),
        details,
    };

    let mut value: Value = serde_json::from_slice(body).map_err(|e| parse_error(e.to_string()))?;

    let total_results = value
        .get(&layout.total_field)
        .and_then(Value::as_u64)
        .ok_or_else(|| parse_error(format!("missing or invalid '{}'", layout.total_field)))?;
    let page_size = value
        .get(&layout.page_size_field)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let records = match value.get_mut(&layout.records_field).map(Value::take) {
        Some(Value::Array(records)) => records,
        _ => {
            return Err(parse_error(format!(
                "missing or invalid '{}'",
                layout.records_field
            )))
        }
    };

    Ok(Page {
        total_results,
        page_size,
        records,
    })
}
