use super::enqueue_fragments;
use crate::application::services::{SourceStatusTracker, UpsertQueue};
use crate::ingestion::domain::{Document, JobMode, SourceUpdate, VulnerabilityFragment};
use crate::ingestion::policies::{FetchDecision, FreshnessPolicy};
use crate::ports::outbound::{RawDownloader, SourceAdapter};
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEBIAN_SOURCE: &str = "debian";

const DEBIAN_FIELD: &str = "debian";

/// Only CVE identifiers are kept; the tracker also lists `TEMP-` entries
const CVE_PREFIX: &str = "CVE-";

/// Parses the Debian security tracker dump into `debian` fragments
///
/// The dump is `{package: {cve: details}}`. A CVE touching several packages
/// gets one fragment holding every `{package, cve_details}` entry, sorted by
/// package name.
pub fn normalize_debian(raw: &[u8]) -> Result<Vec<VulnerabilityFragment>> {
    let packages: Map<String, Value> =
        serde_json::from_slice(raw).context("Malformed Debian tracker data")?;

    let mut by_cve: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (package, entries) in packages {
        let Value::Object(entries) = entries else {
            continue;
        };
        for (cve, details) in entries {
            if !cve.starts_with(CVE_PREFIX) {
                continue;
            }
            by_cve
                .entry(cve)
                .or_default()
                .push(json!({"package": package, "cve_details": details}));
        }
    }

    by_cve
        .into_iter()
        .map(|(cve, mut entries)| {
            entries.sort_by(|a, b| a["package"].as_str().cmp(&b["package"].as_str()));
            VulnerabilityFragment::new(cve, DEBIAN_FIELD, Value::Array(entries))
        })
        .collect()
}

/// Debian security tracker adapter
///
/// The dump has no usable version marker, so updates are gated on wall-clock
/// time since the last success against `interval`. `init` always reloads.
pub struct DebianSource {
    url: String,
    interval: TimeDelta,
    downloader: Arc<dyn RawDownloader>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl DebianSource {
    pub fn new(
        url: impl Into<String>,
        interval: TimeDelta,
        downloader: Arc<dyn RawDownloader>,
        queue: UpsertQueue,
        tracker: Arc<SourceStatusTracker>,
    ) -> Self {
        Self {
            url: url.into(),
            interval,
            downloader,
            queue,
            tracker,
        }
    }
}

#[async_trait]
impl SourceAdapter for DebianSource {
    fn name(&self) -> &str {
        DEBIAN_SOURCE
    }

    async fn update(&self, mode: JobMode) -> Result<SourceUpdate> {
        if mode == JobMode::Update {
            let status = self.tracker.get_status(DEBIAN_SOURCE).await?;
            if let FetchDecision::Skip { reason } =
                FreshnessPolicy::by_interval(status.as_ref(), self.interval, Utc::now())
            {
                return Ok(SourceUpdate::Skipped { reason });
            }
        }

        let raw = self.downloader.download(&self.url).await?;
        let fragments = normalize_debian(&raw)?;
        tracing::info!(
            source = DEBIAN_SOURCE,
            bytes = raw.len(),
            cves = fragments.len(),
            "Downloaded tracker data"
        );

        let records = enqueue_fragments(&self.queue, fragments);
        self.queue.wait_idle().await;
        self.tracker
            .record_success(DEBIAN_SOURCE, Document::new())
            .await?;

        Ok(SourceUpdate::Fetched { records })
    }
}
