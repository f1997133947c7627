use super::enqueue_fragments;
use crate::application::services::{SourceStatusTracker, UpsertQueue};
use crate::ingestion::domain::{JobMode, SourceStatus, SourceUpdate, VulnerabilityFragment};
use crate::ingestion::policies::{FetchDecision, FreshnessPolicy};
use crate::ports::outbound::{RawDownloader, SourceAdapter};
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const CISA_SOURCE: &str = "cisa";

/// Fragment field of the Known Exploited Vulnerabilities catalog
const KEV_FIELD: &str = "kev";

/// The CISA Known Exploited Vulnerabilities catalog
#[derive(Debug, Deserialize)]
pub struct KevCatalog {
    #[serde(rename = "catalogVersion", default)]
    pub catalog_version: Option<String>,
    #[serde(rename = "dateReleased")]
    pub date_released: DateTime<Utc>,
    #[serde(default)]
    pub vulnerabilities: Vec<Value>,
}

/// Parses the KEV feed into its release date and `kev` fragments
///
/// Entries without a `cveID` are dropped.
pub fn normalize_kev(raw: &[u8]) -> Result<(KevCatalog, Vec<VulnerabilityFragment>)> {
    let mut catalog: KevCatalog =
        serde_json::from_slice(raw).context("Malformed KEV catalog")?;

    let fragments = std::mem::take(&mut catalog.vulnerabilities)
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("cveID")?.as_str()?.to_string();
            VulnerabilityFragment::new(id, KEV_FIELD, entry).ok()
        })
        .collect();

    Ok((catalog, fragments))
}

/// CISA KEV adapter
///
/// The catalog carries its own `dateReleased`; an update is skipped when that
/// date (day granularity) has not moved past the stored `source_last_update`.
/// `init` always reloads.
pub struct CisaSource {
    url: String,
    downloader: Arc<dyn RawDownloader>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl CisaSource {
    pub fn new(
        url: impl Into<String>,
        downloader: Arc<dyn RawDownloader>,
        queue: UpsertQueue,
        tracker: Arc<SourceStatusTracker>,
    ) -> Self {
        Self {
            url: url.into(),
            downloader,
            queue,
            tracker,
        }
    }
}

#[async_trait]
impl SourceAdapter for CisaSource {
    fn name(&self) -> &str {
        CISA_SOURCE
    }

    async fn update(&self, mode: JobMode) -> Result<SourceUpdate> {
        let raw = self.downloader.download(&self.url).await?;
        let (catalog, fragments) = normalize_kev(&raw)?;
        tracing::info!(
            source = CISA_SOURCE,
            bytes = raw.len(),
            entries = fragments.len(),
            released = %catalog.date_released,
            "Downloaded catalog"
        );

        if mode == JobMode::Update {
            let status = self.tracker.get_status(CISA_SOURCE).await?;
            if let FetchDecision::Skip { reason } =
                FreshnessPolicy::by_marker(status.as_ref(), catalog.date_released)
            {
                return Ok(SourceUpdate::Skipped { reason });
            }
        }

        let records = enqueue_fragments(&self.queue, fragments);
        self.queue.wait_idle().await;

        let mut markers = SourceStatus::marker(catalog.date_released);
        if let Some(version) = catalog.catalog_version {
            markers.insert("catalog_version".to_string(), Value::String(version));
        }
        self.tracker.record_success(CISA_SOURCE, markers).await?;

        Ok(SourceUpdate::Fetched { records })
    }
}
