use crate::ingestion::domain::SourceStatus;
use chrono::{DateTime, TimeDelta, Utc};

/// Timestamp layout accepted by the NVD `lastMod*Date` filters
const WINDOW_BOUND_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Outcome of a freshness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    Fetch,
    Skip { reason: String },
}

impl FetchDecision {
    pub fn should_fetch(&self) -> bool {
        matches!(self, FetchDecision::Fetch)
    }
}

/// Modification window for an incremental fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn start_param(&self) -> String {
        self.start.format(WINDOW_BOUND_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(WINDOW_BOUND_FORMAT).to_string()
    }

    /// Consecutive windows covering `self`, none longer than `max_span`
    pub fn split(&self, max_span: TimeDelta) -> Vec<FetchWindow> {
        if max_span <= TimeDelta::zero() {
            return vec![*self];
        }

        let mut windows = Vec::new();
        let mut start = self.start;
        while self.end - start > max_span {
            let end = start + max_span;
            windows.push(FetchWindow { start, end });
            start = end;
        }
        windows.push(FetchWindow {
            start,
            end: self.end,
        });
        windows
    }

    /// Human readable window length, e.g. "1 days, 2 hours, 5 minutes"
    pub fn describe_duration(&self) -> String {
        let duration = self.end - self.start;
        let days = duration.num_days();
        let hours = duration.num_hours() % 24;
        let minutes = duration.num_minutes() % 60;
        if days > 0 {
            format!("{} days, {} hours, {} minutes", days, hours, minutes)
        } else {
            format!("{} hours, {} minutes", hours, minutes)
        }
    }
}

/// Freshness rules shared by the source adapters.
///
/// The policy never decides *how* to fetch, only *whether*:
/// - no stored status means a full fetch
/// - sources with an upstream marker compare it at day granularity
/// - sources without one compare wall-clock time against their interval
pub struct FreshnessPolicy;

impl FreshnessPolicy {
    /// Decision for a source exposing its own release or score date
    pub fn by_marker(status: Option<&SourceStatus>, upstream_marker: DateTime<Utc>) -> FetchDecision {
        let Some(stored) = status.and_then(|s| s.source_last_update) else {
            return FetchDecision::Fetch;
        };

        if stored.date_naive() >= upstream_marker.date_naive() {
            FetchDecision::Skip {
                reason: format!(
                    "upstream marker {} has not advanced past stored {}",
                    upstream_marker.date_naive(),
                    stored.date_naive()
                ),
            }
        } else {
            FetchDecision::Fetch
        }
    }

    /// Decision for a source without an upstream marker
    pub fn by_interval(
        status: Option<&SourceStatus>,
        interval: TimeDelta,
        now: DateTime<Utc>,
    ) -> FetchDecision {
        let Some(status) = status else {
            return FetchDecision::Fetch;
        };

        let elapsed = now - status.last_updated;
        if elapsed >= interval {
            FetchDecision::Fetch
        } else {
            FetchDecision::Skip {
                reason: format!(
                    "last update {} minutes ago, interval is {} minutes",
                    elapsed.num_minutes(),
                    interval.num_minutes()
                ),
            }
        }
    }

    /// Incremental window ending at `now`.
    ///
    /// Starts at the stored `last_updated`, or `fallback` before `now` when the
    /// source never completed.
    pub fn update_window(
        status: Option<&SourceStatus>,
        now: DateTime<Utc>,
        fallback: TimeDelta,
    ) -> FetchWindow {
        let start = status
            .map(|s| s.last_updated)
            .filter(|start| *start <= now)
            .unwrap_or(now - fallback);
        FetchWindow { start, end: now }
    }
}
