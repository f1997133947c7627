use cvemate::adapters::outbound::network::{ReqwestDownloader, ReqwestPageClient};
use cvemate::adapters::outbound::storage::SqliteDocumentStore;
use cvemate::application::dto::{JobReport, SourceResult};
use cvemate::application::factories::{SourceDependencies, SourceFactory};
use cvemate::application::scheduler::{JobScheduler, SchedulerSettings};
use cvemate::application::services::{SourceStatusTracker, UpsertQueue};
use cvemate::application::use_cases::RunIngestionJobUseCase;
use cvemate::cli::{Args, RunMode};
use cvemate::config::{
    default_config, discover_config, load_config_from_path, warn_unknown_fields, ConfigFile,
};
use cvemate::ports::outbound::DocumentStore;
use cvemate::shared::error::ExitCode;
use cvemate::shared::Result;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse command-line arguments; clap exits with code 2 on error
    let args = Args::parse_args();

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\n❌ An error occurred:\n");
            eprintln!("{}", e);

            // Display error chain
            for cause in e.chain().skip(1) {
                eprintln!("\nCaused by: {}", cause);
            }

            eprintln!();
            ExitCode::ApplicationError
        }
    };

    process::exit(code.as_i32());
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;
    init_tracing(&args, &config);
    warn_unknown_fields(&config);

    // Create adapters (Dependency Injection)
    let store: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::open(&config.storage.path, &config.storage.prefix).await?,
    );
    let queue = UpsertQueue::new(store.clone())?;
    let tracker = Arc::new(SourceStatusTracker::new(store.clone()));
    let deps = SourceDependencies {
        store,
        queue: queue.clone(),
        tracker: tracker.clone(),
        page_client: Arc::new(ReqwestPageClient::new(Duration::from_secs(
            config.nvd.request_timeout,
        ))?),
        downloader: Arc::new(ReqwestDownloader::new(Duration::from_secs(
            config.download_timeout,
        ))?),
    };

    let sources = SourceFactory::build_sources(&config, &deps);
    if sources.is_empty() {
        tracing::warn!("Every source is disabled; jobs will only stamp the overall status");
    }
    let job = Arc::new(RunIngestionJobUseCase::new(sources, queue, tracker.clone()));
    tracing::info!(
        storage = %config.storage.path.display(),
        sources = ?job.source_names(),
        "cvemate ready"
    );

    match args.run_mode() {
        RunMode::Once(mode) => {
            let report = job.execute(mode).await?;
            print_summary(&report);
            if report.has_failures() {
                Ok(ExitCode::SourcesFailed)
            } else {
                Ok(ExitCode::Success)
            }
        }
        RunMode::Daemon => {
            let settings = SchedulerSettings {
                interval: config.scheduler.interval(),
                poll_interval: config.scheduler.poll_interval(),
                timezone: config.timezone()?,
            };
            let scheduler = JobScheduler::new(job, tracker, settings);

            let shutdown = Arc::new(AtomicBool::new(false));
            spawn_shutdown_listener(shutdown.clone());

            scheduler.run(shutdown).await?;
            tracing::info!("Scheduler stopped");
            Ok(ExitCode::Success)
        }
    }
}

/// Explicit path, then ./cvemate.yml, then built-in defaults
fn load_config(args: &Args) -> Result<ConfigFile> {
    if let Some(path) = args.config.as_deref() {
        return load_config_from_path(path);
    }
    match discover_config(Path::new("."))? {
        Some(config) => Ok(config),
        None => default_config(),
    }
}

/// RUST_LOG wins, then --debug, then the configured level
fn init_tracing(args: &Args, config: &ConfigFile) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if args.debug {
            "debug"
        } else {
            config.log_level.as_str()
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spawn_shutdown_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received; stopping after the current job");
                shutdown.store(true, Ordering::Release);
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
        }
    });
}

fn print_summary(report: &JobReport) {
    eprintln!("\n📊 Job {} ({})", report.job_id, report.mode);
    for outcome in &report.outcomes {
        let line = match &outcome.result {
            SourceResult::Fetched { records } => format!("✅ {} records", records),
            SourceResult::Skipped { reason } => format!("⏭️  skipped: {}", reason),
            SourceResult::Failed { error } => format!("❌ failed: {}", error),
        };
        eprintln!(
            "   {:<8} {} ({:.1}s)",
            outcome.source,
            line,
            outcome.elapsed.as_secs_f64()
        );
    }
    eprintln!(
        "   {} records in {:.1}s\n",
        report.records_fetched(),
        report.elapsed.as_secs_f64()
    );
}
