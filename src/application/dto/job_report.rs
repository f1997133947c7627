use crate::ingestion::domain::JobMode;
use std::time::Duration;
use uuid::Uuid;

/// Result of one source within a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceResult {
    Fetched { records: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source: String,
    pub result: SourceResult,
    pub elapsed: Duration,
}

/// JobReport - Response DTO of one ingestion job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub mode: JobMode,
    pub outcomes: Vec<SourceOutcome>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, SourceResult::Failed { .. }))
            .map(|o| o.source.as_str())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_sources().is_empty()
    }

    /// Records handed to storage across all sources
    pub fn records_fetched(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                SourceResult::Fetched { records } => records,
                _ => 0,
            })
            .sum()
    }
}
