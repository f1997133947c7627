use super::enqueue_fragments;
use crate::application::dto::FetchRequest;
use crate::application::services::{PaginatedFetcher, SourceStatusTracker, UpsertQueue};
use crate::ingestion::domain::{
    Document, JobMode, SourceUpdate, VulnerabilityFragment, COLLECTION_CVE, KEY_FIELD_ID,
};
use crate::ingestion::policies::FreshnessPolicy;
use crate::ports::outbound::{DocumentStore, SourceAdapter};
use crate::shared::Result;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const NVD_SOURCE: &str = "nvd";

/// Header carrying the NVD API key
const API_KEY_HEADER: &str = "apiKey";

/// Window used for an update when the source never completed
const DEFAULT_UPDATE_WINDOW_HOURS: i64 = 24;

/// Longest `lastModStartDate..lastModEndDate` range the API accepts
const MAX_UPDATE_WINDOW_DAYS: i64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvdSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub results_per_page: u64,
}

/// Turns one page of the NVD CVE API into `nvd` fragments
///
/// Each record is `{"cve": {"id": ..., ...}}`; the whole `cve` object becomes
/// the fragment. Records without an id are counted and left out.
pub fn normalize_nvd_page(records: Vec<Value>) -> (Vec<VulnerabilityFragment>, usize) {
    let mut fragments = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for mut record in records {
        let cve = record.get_mut("cve").map(Value::take).unwrap_or(Value::Null);
        let id = cve.get("id").and_then(Value::as_str).map(str::to_string);

        match id.map(|id| VulnerabilityFragment::new(id, NVD_SOURCE, cve)) {
            Some(Ok(fragment)) => fragments.push(fragment),
            _ => skipped += 1,
        }
    }

    (fragments, skipped)
}

/// NVD CVE API 2.0 adapter
///
/// `init` downloads the whole catalogue; `update` asks only for CVEs
/// modified since the last successful run (`lastModStartDate` /
/// `lastModEndDate`), falling back to the last 24 hours. Windows longer than
/// 120 days are fetched as consecutive sub-windows.
pub struct NvdSource {
    settings: NvdSettings,
    fetcher: PaginatedFetcher,
    store: Arc<dyn DocumentStore>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl NvdSource {
    pub fn new(
        settings: NvdSettings,
        fetcher: PaginatedFetcher,
        store: Arc<dyn DocumentStore>,
        queue: UpsertQueue,
        tracker: Arc<SourceStatusTracker>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            store,
            queue,
            tracker,
        }
    }

    fn base_request(&self) -> FetchRequest {
        let request = FetchRequest::new(&self.settings.url, self.settings.results_per_page);
        match self.settings.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.with_header(API_KEY_HEADER, key),
            _ => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for NvdSource {
    fn name(&self) -> &str {
        NVD_SOURCE
    }

    async fn update(&self, mode: JobMode) -> Result<SourceUpdate> {
        let now = Utc::now();
        let requests = match mode {
            JobMode::Init => {
                if self.store.ensure_index(COLLECTION_CVE, KEY_FIELD_ID).await? {
                    tracing::info!(
                        collection = COLLECTION_CVE,
                        field = KEY_FIELD_ID,
                        "Created index"
                    );
                }
                vec![self.base_request()]
            }
            JobMode::Update => {
                let status = self.tracker.get_status(NVD_SOURCE).await?;
                let window = FreshnessPolicy::update_window(
                    status.as_ref(),
                    now,
                    TimeDelta::hours(DEFAULT_UPDATE_WINDOW_HOURS),
                );
                let windows = window.split(TimeDelta::days(MAX_UPDATE_WINDOW_DAYS));
                tracing::info!(
                    source = NVD_SOURCE,
                    start = %window.start_param(),
                    end = %window.end_param(),
                    duration = %window.describe_duration(),
                    requests = windows.len(),
                    "Downloading modification window"
                );
                windows
                    .iter()
                    .map(|window| {
                        self.base_request()
                            .with_param("lastModStartDate", window.start_param())
                            .with_param("lastModEndDate", window.end_param())
                    })
                    .collect()
            }
        };

        let skipped = AtomicUsize::new(0);
        let queue = &self.queue;
        let mut fetched = 0;
        for request in &requests {
            let summary = self
                .fetcher
                .fetch_all(request, |records| {
                    let (fragments, missing) = normalize_nvd_page(records);
                    skipped.fetch_add(missing, Ordering::Relaxed);
                    enqueue_fragments(queue, fragments);
                    Ok(())
                })
                .await?;
            fetched += summary.records;
        }

        let skipped = skipped.into_inner();
        if skipped > 0 {
            tracing::warn!(source = NVD_SOURCE, skipped, "Records without a CVE id");
        }

        self.queue.wait_idle().await;
        self.tracker
            .record_success_at(NVD_SOURCE, Document::new(), now)
            .await?;

        Ok(SourceUpdate::Fetched {
            records: fetched - skipped,
        })
    }
}
