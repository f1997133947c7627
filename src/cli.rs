use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::ingestion::domain::JobMode;

/// How the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One job, then exit
    Once(JobMode),
    /// Scheduler loop until interrupted
    Daemon,
}

/// Scheduled CVE ingestion from NVD, CISA KEV, EPSS and Debian
#[derive(Parser, Debug)]
#[command(name = "cvemate")]
#[command(version)]
#[command(
    about = "Merge NVD, CISA KEV, EPSS and Debian vulnerability feeds into one document store",
    long_about = None
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["init", "update", "daemon"])
))]
pub struct Args {
    /// Path to a config file (.yml, .yaml or .toml).
    /// Defaults to ./cvemate.yml when present, otherwise built-in defaults.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub debug: bool,

    /// Run one full load of every source and exit
    #[arg(long)]
    pub init: bool,

    /// Run one incremental update and exit
    #[arg(long)]
    pub update: bool,

    /// Keep running, one job per scheduler interval
    #[arg(long)]
    pub daemon: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn run_mode(&self) -> RunMode {
        if self.daemon {
            RunMode::Daemon
        } else if self.init {
            RunMode::Once(JobMode::Init)
        } else {
            RunMode::Once(JobMode::Update)
        }
    }
}
