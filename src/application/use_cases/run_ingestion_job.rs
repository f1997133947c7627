use crate::application::dto::{JobReport, SourceOutcome, SourceResult};
use crate::application::services::{SourceStatusTracker, UpsertQueue};
use crate::ingestion::domain::{Document, JobMode, SourceUpdate, OVERALL_JOB_SOURCE};
use crate::ports::outbound::SourceAdapter;
use crate::shared::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// RunIngestionJobUseCase - one ingestion job over every configured source
///
/// Sources run one after another in the order given (NVD first, since the
/// other feeds enrich its identifiers). A failing source is logged and the
/// job moves on; failures never stop later sources or future jobs.
///
/// Once all sources are done the upsert queue is drained and the
/// `overall-job` status is stamped, whatever the individual outcomes.
pub struct RunIngestionJobUseCase {
    sources: Vec<Arc<dyn SourceAdapter>>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl RunIngestionJobUseCase {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        queue: UpsertQueue,
        tracker: Arc<SourceStatusTracker>,
    ) -> Self {
        Self {
            sources,
            queue,
            tracker,
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Executes one job
    ///
    /// # Errors
    /// Only a failure to stamp the `overall-job` status is returned; source
    /// failures are reported in the [`JobReport`].
    pub async fn execute(&self, mode: JobMode) -> Result<JobReport> {
        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("job", job_id = %job_id, mode = %mode);
        self.run(job_id, mode).instrument(span).await
    }

    async fn run(&self, job_id: Uuid, mode: JobMode) -> Result<JobReport> {
        let started = Instant::now();
        tracing::info!(sources = self.sources.len(), "Job started");

        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            outcomes.push(self.run_source(source.as_ref(), mode).await);
        }

        self.queue.wait_idle().await;
        self.tracker
            .record_success(OVERALL_JOB_SOURCE, Document::new())
            .await?;

        let report = JobReport {
            job_id,
            mode,
            outcomes,
            elapsed: started.elapsed(),
        };

        let stats = self.queue.stats();
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            records = report.records_fetched(),
            failed_sources = report.failed_sources().len(),
            failed_batches = stats.failed_batches,
            "Job finished"
        );
        Ok(report)
    }

    async fn run_source(&self, source: &dyn SourceAdapter, mode: JobMode) -> SourceOutcome {
        let started = Instant::now();
        let name = source.name().to_string();
        tracing::info!(source = %name, "Updating source");

        let result = match source.update(mode).await {
            Ok(SourceUpdate::Fetched { records }) => {
                tracing::info!(
                    source = %name,
                    records,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Source updated"
                );
                SourceResult::Fetched { records }
            }
            Ok(SourceUpdate::Skipped { reason }) => {
                tracing::info!(source = %name, reason = %reason, "Source skipped");
                SourceResult::Skipped { reason }
            }
            Err(err) => {
                let error = format!("{:#}", err);
                tracing::error!(
                    source = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "Source update failed"
                );
                SourceResult::Failed { error }
            }
        };

        SourceOutcome {
            source: name,
            result,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::storage::InMemoryDocumentStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedSource {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SourceAdapter for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn update(&self, mode: JobMode) -> Result<SourceUpdate> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, mode));
            if self.fail {
                anyhow::bail!("upstream returned HTTP 500");
            }
            Ok(SourceUpdate::Fetched { records: 3 })
        }
    }

    fn source(
        name: &'static str,
        fail: bool,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn SourceAdapter> {
        Arc::new(ScriptedSource {
            name,
            fail,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_failed_source_does_not_stop_later_sources() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let tracker = Arc::new(SourceStatusTracker::new(store.clone()));
        let queue = UpsertQueue::new(store.clone()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let job = RunIngestionJobUseCase::new(
            vec![
                source("nvd", false, &log),
                source("cisa", true, &log),
                source("epss", false, &log),
            ],
            queue,
            tracker.clone(),
        );

        let report = job.execute(JobMode::Update).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["nvd:update", "cisa:update", "epss:update"]
        );
        assert_eq!(report.failed_sources(), vec!["cisa"]);
        assert_eq!(report.records_fetched(), 6);
        assert!(tracker
            .get_status(OVERALL_JOB_SOURCE)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_overall_status_stamped_even_if_all_fail() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let tracker = Arc::new(SourceStatusTracker::new(store.clone()));
        let queue = UpsertQueue::new(store.clone()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let job = RunIngestionJobUseCase::new(vec![source("nvd", true, &log)], queue, tracker.clone());
        let report = job.execute(JobMode::Init).await.unwrap();

        assert!(report.has_failures());
        assert_eq!(report.mode, JobMode::Init);
        assert!(tracker
            .get_status(OVERALL_JOB_SOURCE)
            .await
            .unwrap()
            .is_some());
    }
}
