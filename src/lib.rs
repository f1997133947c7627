//! cvemate - scheduled CVE ingestion
//!
//! Pulls the NVD CVE API, the CISA Known Exploited Vulnerabilities catalog,
//! FIRST EPSS scores and the Debian security tracker, and merges them into a
//! single `cve` collection keyed by CVE id, one field per source.
//!
//! # Architecture
//!
//! The library is organized into the following layers:
//!
//! - **Domain Layer** (`ingestion`): Fragments, write requests, source status and
//!   the pure freshness / paging / scheduling rules
//! - **Application Layer** (`application`): Rate limiting, paginated fetching,
//!   the upsert queue, status tracking, the job use case and its scheduler
//! - **Ports** (`ports`): Interface definitions for infrastructure
//! - **Adapters** (`adapters`): HTTP clients, document stores and source adapters
//! - **Shared** (`shared`): Common utilities and error types
//!
//! # Example
//!
//! ```no_run
//! use cvemate::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<()> {
//! let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
//! let queue = UpsertQueue::new(store.clone())?;
//! let tracker = Arc::new(SourceStatusTracker::new(store.clone()));
//!
//! let job = RunIngestionJobUseCase::new(Vec::new(), queue, tracker);
//! let report = job.execute(JobMode::Init).await?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod ingestion;
pub mod ports;
pub mod shared;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::outbound::network::{ReqwestDownloader, ReqwestPageClient};
    pub use crate::adapters::outbound::sources::{
        CisaSource, DebianSource, EpssSource, NvdSettings, NvdSource,
    };
    pub use crate::adapters::outbound::storage::{
        InMemoryDocumentStore, SqliteDocumentStore, DATABASE_FILE_NAME,
    };
    pub use crate::application::dto::{FetchRequest, JobReport, SourceOutcome, SourceResult};
    pub use crate::application::factories::{SourceDependencies, SourceFactory};
    pub use crate::application::scheduler::{JobScheduler, SchedulerSettings};
    pub use crate::application::services::{
        PaginatedFetcher, RateLimiter, RetryPolicy, SourceStatusTracker, UpsertQueue,
    };
    pub use crate::application::use_cases::RunIngestionJobUseCase;
    pub use crate::ingestion::domain::{
        Document, JobMode, SourceStatus, SourceUpdate, VulnerabilityFragment, WriteMode,
        WriteRequest,
    };
    pub use crate::ports::outbound::{
        DocumentStore, PageClient, PageRequest, RawDownloader, SourceAdapter, WriteOperation,
    };
    pub use crate::shared::error::{ExitCode, FetchError, IngestError};
    pub use crate::shared::Result;
}
