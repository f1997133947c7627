use crate::application::dto::JobReport;
use crate::application::services::SourceStatusTracker;
use crate::application::use_cases::RunIngestionJobUseCase;
use crate::ingestion::domain::{JobMode, OVERALL_JOB_SOURCE};
use crate::ingestion::services::next_run_delay;
use crate::shared::error::IngestError;
use crate::shared::Result;
use chrono::{FixedOffset, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Clears the running flag when a job ends, including on error
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Time between the end of one job and the start of the next
    pub interval: Duration,
    /// How often the wait loop checks the shutdown flag
    pub poll_interval: Duration,
    /// Zone used when logging the next run time
    pub timezone: FixedOffset,
}

/// JobScheduler sequences ingestion jobs.
///
/// A job is either running or not; `try_run_job` refuses to start a second
/// one while the first is in progress. In daemon mode the first job starts
/// after `max(0, interval - elapsed_since_last_success)`, as an `init` pass
/// when no job ever completed; afterwards the timer is re-armed to `interval`
/// from each job's completion.
///
/// Shutdown is cooperative: the flag is polled between ticks of the wait
/// loop and a job already running is allowed to finish.
pub struct JobScheduler {
    job: Arc<RunIngestionJobUseCase>,
    tracker: Arc<SourceStatusTracker>,
    settings: SchedulerSettings,
    running: AtomicBool,
}

impl JobScheduler {
    pub fn new(
        job: Arc<RunIngestionJobUseCase>,
        tracker: Arc<SourceStatusTracker>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            job,
            tracker,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one job unless another one is in progress
    ///
    /// # Errors
    /// Returns [`IngestError::JobAlreadyRunning`] on overlap, or the job's own
    /// error.
    pub async fn try_run_job(&self, mode: JobMode) -> Result<JobReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(mode = %mode, "Job requested while another one is running");
            return Err(IngestError::JobAlreadyRunning.into());
        }
        let _guard = RunningGuard(&self.running);

        self.job.execute(mode).await
    }

    /// Mode of the next job: `init` until a job has completed once
    pub async fn next_mode(&self) -> Result<JobMode> {
        let status = self.tracker.get_status(OVERALL_JOB_SOURCE).await?;
        Ok(if status.is_some() {
            JobMode::Update
        } else {
            JobMode::Init
        })
    }

    /// Delay and mode of the first job after startup
    pub async fn next_delay(&self) -> Result<(Duration, JobMode)> {
        let status = self.tracker.get_status(OVERALL_JOB_SOURCE).await?;
        let mode = if status.is_some() {
            JobMode::Update
        } else {
            JobMode::Init
        };
        let delay = next_run_delay(
            status.map(|s| s.last_updated),
            self.settings.interval,
            Utc::now(),
        );
        Ok((delay, mode))
    }

    /// Runs jobs until `shutdown` is set
    ///
    /// # Errors
    /// Only a failure to read the initial schedule is returned; job errors
    /// are logged and the loop continues.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let (mut delay, mut mode) = self.next_delay().await?;
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            "Scheduler started"
        );

        loop {
            let next_run = Utc::now() + delay;
            tracing::info!(
                mode = %mode,
                next_run = %next_run.with_timezone(&self.settings.timezone),
                delay_secs = delay.as_secs(),
                "Next job scheduled"
            );

            if !self.wait(delay, &shutdown).await {
                tracing::info!("Shutdown requested, scheduler stopping");
                return Ok(());
            }

            match self.try_run_job(mode).await {
                Ok(report) if report.has_failures() => tracing::warn!(
                    job_id = %report.job_id,
                    failed = ?report.failed_sources(),
                    "Job finished with failed sources"
                ),
                Ok(report) => tracing::info!(job_id = %report.job_id, "Job finished"),
                Err(err) => tracing::error!(error = %format!("{:#}", err), "Job failed"),
            }

            mode = match self.next_mode().await {
                Ok(mode) => mode,
                Err(err) => {
                    tracing::error!(
                        error = %format!("{:#}", err),
                        "Failed to read job status, assuming update"
                    );
                    JobMode::Update
                }
            };
            delay = self.settings.interval;
        }
    }

    /// Sleeps `delay` in `poll_interval` ticks; false if shutdown was requested
    async fn wait(&self, delay: Duration, shutdown: &AtomicBool) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let tick = self.settings.poll_interval.min(deadline - now);
            tokio::time::sleep(tick).await;
        }
    }
}
