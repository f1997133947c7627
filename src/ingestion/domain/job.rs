use std::fmt;

/// Status key stamped after every job, successful sources or not
pub const OVERALL_JOB_SOURCE: &str = "overall-job";

/// Kind of pass a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Full download of every source, used when no job ever completed
    Init,
    /// Incremental pass driven by each source's stored status
    Update,
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Init => write!(f, "init"),
            JobMode::Update => write!(f, "update"),
        }
    }
}

/// What a source adapter did during one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUpdate {
    /// Records were fetched and handed to the upsert queue
    Fetched { records: usize },
    /// Nothing to do, upstream has not advanced
    Skipped { reason: String },
}
