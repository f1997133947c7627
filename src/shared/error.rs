use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the `cvemate` binary.
///
/// Lets cron wrappers and supervisors tell a partially failed job apart
/// from a broken installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every source completed (or was skipped as up to date)
    Success = 0,
    /// The job ran to the end but at least one source failed
    SourcesFailed = 1,
    /// Invalid command-line arguments (clap parsing errors)
    InvalidArguments = 2,
    /// Configuration or storage failure at startup
    ApplicationError = 3,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "Success (0)"),
            ExitCode::SourcesFailed => write!(f, "Sources Failed (1)"),
            ExitCode::InvalidArguments => write!(f, "Invalid Arguments (2)"),
            ExitCode::ApplicationError => write!(f, "Application Error (3)"),
        }
    }
}

/// Upstream fetch errors.
///
/// Splits failures into the transient class (retried with a fixed delay) and
/// the fatal class (aborts the source for the current job).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {details}")]
    Transport {
        url: String,
        timeout: bool,
        details: String,
    },

    #[error("Invalid response body from {url}: {details}")]
    Parse { url: String, details: String },

    #[error("Giving up on {url} after {attempts} attempt(s); last error: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// Whether the error should be retried under the given retryable statuses
    pub fn is_transient(&self, retryable_statuses: &[u16]) -> bool {
        match self {
            FetchError::Status { status, .. } => retryable_statuses.contains(status),
            FetchError::Transport { timeout, .. } => *timeout,
            FetchError::Parse { .. } | FetchError::RetriesExhausted { .. } => false,
        }
    }
}

/// Application-level errors for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid configuration: {path}\nReason: {reason}\n\n💡 Hint: {hint}")]
    ConfigError {
        path: PathBuf,
        reason: String,
        hint: String,
    },

    #[error("Storage failure on collection '{collection}': {details}")]
    StorageError { collection: String, details: String },

    #[error("A job is already running; refusing to start another one")]
    JobAlreadyRunning,
}
