//! Configuration file support for cvemate.
//!
//! A single YAML (`.yml` / `.yaml`) or TOML (`.toml`) file, discovered as
//! `cvemate.yml` in the working directory when no path is given. Every field
//! has a default, so an empty file is a valid configuration.

use anyhow::Context;
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::services::DEFAULT_MAX_THREADS;
use crate::shared::error::IngestError;
use crate::shared::Result;

pub const CONFIG_FILENAME: &str = "cvemate.yml";

pub const ENV_STORAGE_PATH: &str = "CVEMATE_STORAGE_PATH";
pub const ENV_STORAGE_PREFIX: &str = "CVEMATE_STORAGE_PREFIX";
pub const ENV_NVD_API_KEY: &str = "CVEMATE_NVD_API_KEY";

/// Upper bound for every `interval_hours` setting (one year)
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;

/// Top-level configuration file schema.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub log_level: String,
    /// Timeout for single-file feed downloads, in seconds
    pub download_timeout: u64,
    pub storage: StorageSection,
    pub scheduler: SchedulerSection,
    pub nvd: NvdSection,
    pub cisa: FeedSection,
    pub epss: FeedSection,
    pub debian: DebianSection,
    /// Captures unknown fields for warnings.
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_yaml_ng::Value>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            download_timeout: 300,
            storage: StorageSection::default(),
            scheduler: SchedulerSection::default(),
            nvd: NvdSection::default(),
            cisa: FeedSection::with_url(
                "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json",
            ),
            epss: FeedSection::with_url("https://epss.cyentia.com/epss_scores-current.csv"),
            debian: DebianSection::default(),
            unknown_fields: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the database file
    pub path: PathBuf,
    /// Prepended to every collection (table) name
    pub prefix: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerSection {
    pub interval_hours: u64,
    pub poll_interval_secs: u64,
    /// `UTC` or a fixed offset such as `+02:00`; only affects log output
    pub timezone: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            poll_interval_secs: 5,
            timezone: "UTC".to_string(),
        }
    }
}

impl SchedulerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NvdSection {
    pub enabled: bool,
    pub url: String,
    pub api_key: Option<String>,
    pub public_rate_limit: usize,
    pub apikey_rate_limit: usize,
    /// Rate limit window, in seconds
    pub rolling_window: u64,
    pub retry_limit: u32,
    /// Delay between retries, in seconds
    pub retry_delay: u64,
    pub results_per_page: u64,
    pub max_threads: usize,
    /// Per-request timeout, in seconds
    pub request_timeout: u64,
}

impl Default for NvdSection {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string(),
            api_key: None,
            public_rate_limit: 5,
            apikey_rate_limit: 50,
            rolling_window: 30,
            retry_limit: 3,
            retry_delay: 30,
            results_per_page: 2000,
            max_threads: DEFAULT_MAX_THREADS,
            request_timeout: 120,
        }
    }
}

impl NvdSection {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Calls allowed per window: the keyed budget when an API key is set
    pub fn rate_limit(&self) -> usize {
        if self.has_api_key() {
            self.apikey_rate_limit
        } else {
            self.public_rate_limit
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedSection {
    pub enabled: bool,
    pub url: String,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
        }
    }
}

impl FeedSection {
    fn with_url(url: &str) -> Self {
        Self {
            enabled: true,
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebianSection {
    pub enabled: bool,
    pub url: String,
    /// Minimum hours between two downloads
    pub interval_hours: u64,
}

impl Default for DebianSection {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://security-tracker.debian.org/tracker/data/json".to_string(),
            interval_hours: 24,
        }
    }
}

impl ConfigFile {
    /// Parsed scheduler timezone
    pub fn timezone(&self) -> Result<FixedOffset> {
        parse_timezone(&self.scheduler.timezone)
    }
}

/// Parses `UTC` / `Z` or a `+HH:MM` offset
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0).context("Invalid UTC offset");
    }
    value
        .parse::<FixedOffset>()
        .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", value, e))
}

/// Load config from an explicit path. Returns an error if the file is not found.
pub fn load_config_from_path(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\n💡 Hint: Check that the file exists and is readable.",
            path.display()
        )
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let mut config: ConfigFile = match extension.as_deref() {
        Some("toml") => toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}\n\n💡 Hint: Ensure the file contains valid TOML syntax.",
                path.display()
            )
        })?,
        Some("yml") | Some("yaml") => serde_yaml_ng::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}\n\n💡 Hint: Ensure the file contains valid YAML syntax.",
                path.display()
            )
        })?,
        _ => {
            return Err(IngestError::ConfigError {
                path: path.to_path_buf(),
                reason: "Unsupported config file extension".to_string(),
                hint: "Use a .yml, .yaml or .toml file.".to_string(),
            }
            .into())
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config, path)?;

    Ok(config)
}

/// Auto-discover config in a directory. Returns `None` silently if not found.
pub fn discover_config(dir: &Path) -> Result<Option<ConfigFile>> {
    let config_path = dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(None);
    }

    let config = load_config_from_path(&config_path)?;
    Ok(Some(config))
}

/// Built-in defaults plus environment overrides, for runs without a file
pub fn default_config() -> Result<ConfigFile> {
    let mut config = ConfigFile::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config, Path::new("<defaults>"))?;
    Ok(config)
}

/// Environment variables win over file values
pub fn apply_env_overrides<F>(config: &mut ConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_STORAGE_PATH).filter(|v| !v.is_empty()) {
        config.storage.path = PathBuf::from(path);
    }
    if let Some(prefix) = lookup(ENV_STORAGE_PREFIX) {
        config.storage.prefix = prefix;
    }
    if let Some(key) = lookup(ENV_NVD_API_KEY).filter(|v| !v.is_empty()) {
        config.nvd.api_key = Some(key);
    }
}

fn config_error(path: &Path, reason: String, hint: &str) -> anyhow::Error {
    IngestError::ConfigError {
        path: path.to_path_buf(),
        reason,
        hint: hint.to_string(),
    }
    .into()
}

/// Validate the loaded configuration.
fn validate_config(config: &ConfigFile, path: &Path) -> Result<()> {
    let nvd = &config.nvd;
    let positive = [
        ("nvd.public_rate_limit", nvd.public_rate_limit as u64),
        ("nvd.apikey_rate_limit", nvd.apikey_rate_limit as u64),
        ("nvd.rolling_window", nvd.rolling_window),
        ("nvd.results_per_page", nvd.results_per_page),
        ("nvd.max_threads", nvd.max_threads as u64),
        ("nvd.request_timeout", nvd.request_timeout),
        ("scheduler.interval_hours", config.scheduler.interval_hours),
        ("scheduler.poll_interval_secs", config.scheduler.poll_interval_secs),
        ("download_timeout", config.download_timeout),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(config_error(
                path,
                format!("'{}' must be greater than 0", field),
                "Remove the field to use its default value.",
            ));
        }
    }

    let intervals = [
        ("scheduler.interval_hours", config.scheduler.interval_hours),
        ("debian.interval_hours", config.debian.interval_hours),
    ];
    for (field, hours) in intervals {
        if hours > MAX_INTERVAL_HOURS {
            return Err(config_error(
                path,
                format!(
                    "'{}' must be at most {} (one year), got {}",
                    field, MAX_INTERVAL_HOURS, hours
                ),
                "Use a shorter interval.",
            ));
        }
    }

    let urls = [
        ("nvd.url", nvd.enabled, &nvd.url),
        ("cisa.url", config.cisa.enabled, &config.cisa.url),
        ("epss.url", config.epss.enabled, &config.epss.url),
        ("debian.url", config.debian.enabled, &config.debian.url),
    ];
    for (field, enabled, url) in urls {
        if enabled && url.trim().is_empty() {
            return Err(config_error(
                path,
                format!("'{}' must not be empty", field),
                "Set the feed URL or disable the source with 'enabled: false'.",
            ));
        }
    }

    if let Err(e) = config.timezone() {
        return Err(config_error(
            path,
            e.to_string(),
            "Use 'UTC' or a fixed offset such as '+02:00'.",
        ));
    }

    let prefix = &config.storage.prefix;
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(config_error(
            path,
            format!("'storage.prefix' contains unsupported characters: '{}'", prefix),
            "Use ASCII letters, digits and '_' only.",
        ));
    }

    if config.log_level.trim().is_empty() {
        return Err(config_error(
            path,
            "'log_level' must not be empty".to_string(),
            "Use one of: error, warn, info, debug, trace.",
        ));
    }

    Ok(())
}

/// Warn about unknown fields in the config file.
///
/// Called once logging is up, since the log level itself comes from the file.
pub fn warn_unknown_fields(config: &ConfigFile) {
    for key in config.unknown_fields.keys() {
        tracing::warn!(field = %key, "Unknown config field will be ignored");
    }
}
