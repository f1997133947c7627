use super::enqueue_fragments;
use crate::application::services::{SourceStatusTracker, UpsertQueue};
use crate::ingestion::domain::{JobMode, SourceStatus, SourceUpdate, VulnerabilityFragment};
use crate::ingestion::policies::{FetchDecision, FreshnessPolicy};
use crate::ports::outbound::{RawDownloader, SourceAdapter};
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub const EPSS_SOURCE: &str = "epss";

const EPSS_FIELD: &str = "epss";

/// A parsed EPSS scores file
#[derive(Debug)]
pub struct EpssScores {
    pub model_version: Option<String>,
    pub score_date: DateTime<Utc>,
    pub fragments: Vec<VulnerabilityFragment>,
    /// Rows that could not be parsed
    pub skipped: usize,
}

/// Reads `key:value` pairs of the leading `#model_version:...,score_date:...` line
fn parse_metadata(line: &str) -> Result<(Option<String>, DateTime<Utc>)> {
    let line = line
        .strip_prefix('#')
        .context("EPSS file does not start with a metadata comment")?;

    let mut model_version = None;
    let mut score_date = None;
    for pair in line.split(',') {
        match pair.split_once(':') {
            Some(("model_version", value)) => model_version = Some(value.trim().to_string()),
            Some(("score_date", value)) => score_date = Some(parse_score_date(value.trim())?),
            _ => {}
        }
    }

    let score_date = score_date.context("EPSS metadata has no score_date")?;
    Ok((model_version, score_date))
}

/// Accepts `2024-07-23T00:00:00+0000` as well as RFC 3339
fn parse_score_date(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .with_context(|| format!("Invalid EPSS score_date '{}'", value))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Parses the uncompressed EPSS CSV into `epss` fragments
///
/// Layout: one metadata comment line, a `cve,epss,percentile` header, then
/// one row per CVE. Rows with a missing id or non-numeric score are skipped.
pub fn normalize_epss(raw: &[u8]) -> Result<EpssScores> {
    let text = std::str::from_utf8(raw).context("EPSS file is not valid UTF-8")?;
    let mut lines = text.lines();

    let (model_version, score_date) = parse_metadata(lines.next().unwrap_or_default())?;

    let header: Vec<&str> = lines
        .next()
        .context("EPSS file has no header row")?
        .split(',')
        .map(str::trim)
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .with_context(|| format!("EPSS header has no '{}' column", name))
    };
    let cve_col = column("cve")?;
    let epss_col = column("epss")?;
    let percentile_col = column("percentile")?;

    let mut fragments = Vec::new();
    let mut skipped = 0;
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let row = (
            fields.get(cve_col),
            fields.get(epss_col).and_then(|v| v.parse::<f64>().ok()),
            fields.get(percentile_col).and_then(|v| v.parse::<f64>().ok()),
        );

        let fragment = match row {
            (Some(id), Some(score), Some(percentile)) => VulnerabilityFragment::new(
                *id,
                EPSS_FIELD,
                json!({"epss_score": score, "percentile": percentile}),
            )
            .ok(),
            _ => None,
        };
        match fragment {
            Some(fragment) => fragments.push(fragment),
            None => skipped += 1,
        }
    }

    Ok(EpssScores {
        model_version,
        score_date,
        fragments,
        skipped,
    })
}

/// FIRST EPSS adapter
///
/// Freshness follows the file's own `score_date` at day granularity.
/// `init` always reloads.
pub struct EpssSource {
    url: String,
    downloader: Arc<dyn RawDownloader>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl EpssSource {
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
impl SourceAdapter for EpssSource {
    fn name(&self) -> &str {
        EPSS_SOURCE
    }

    async fn update(&self, mode: JobMode) -> Result<SourceUpdate> {
        let raw = self.downloader.download(&self.url).await?;
        let scores = normalize_epss(&raw)?;
        tracing::info!(
            source = EPSS_SOURCE,
            bytes = raw.len(),
            rows = scores.fragments.len(),
            skipped = scores.skipped,
            score_date = %scores.score_date,
            "Downloaded scores"
        );

        if mode == JobMode::Update {
            let status = self.tracker.get_status(EPSS_SOURCE).await?;
            if let FetchDecision::Skip { reason } =
                FreshnessPolicy::by_marker(status.as_ref(), scores.score_date)
            {
                return Ok(SourceUpdate::Skipped { reason });
            }
        }

        let records = enqueue_fragments(&self.queue, scores.fragments);
        self.queue.wait_idle().await;

        let mut markers = SourceStatus::marker(scores.score_date);
        if let Some(version) = scores.model_version {
            markers.insert("model_version".to_string(), Value::String(version));
        }
        self.tracker.record_success(EPSS_SOURCE, markers).await?;

        Ok(SourceUpdate::Fetched { records })
    }
}
