use crate::adapters::outbound::sources::{
    CisaSource, DebianSource, EpssSource, NvdSettings, NvdSource,
};
use crate::application::services::{
    PaginatedFetcher, RateLimiter, RetryPolicy, SourceStatusTracker, UpsertQueue,
};
use crate::config::{ConfigFile, NvdSection};
use crate::ports::outbound::{DocumentStore, PageClient, RawDownloader, SourceAdapter};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators handed to every source adapter
#[derive(Clone)]
pub struct SourceDependencies {
    pub store: Arc<dyn DocumentStore>,
    pub queue: UpsertQueue,
    pub tracker: Arc<SourceStatusTracker>,
    pub page_client: Arc<dyn PageClient>,
    pub downloader: Arc<dyn RawDownloader>,
}

/// Factory for creating the configured source adapters
///
/// Sources come out in job order: NVD, CISA, EPSS, Debian. Disabled sources
/// are left out.
pub struct SourceFactory;

impl SourceFactory {
    pub fn build_sources(
        config: &ConfigFile,
        deps: &SourceDependencies,
    ) -> Vec<Arc<dyn SourceAdapter>> {
        let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

        if config.nvd.enabled {
            sources.push(Arc::new(NvdSource::new(
                Self::nvd_settings(&config.nvd),
                Self::nvd_fetcher(&config.nvd, deps.page_client.clone()),
                deps.store.clone(),
                deps.queue.clone(),
                deps.tracker.clone(),
            )));
        }
        if config.cisa.enabled {
            sources.push(Arc::new(CisaSource::new(
                &config.cisa.url,
                deps.downloader.clone(),
                deps.queue.clone(),
                deps.tracker.clone(),
            )));
        }
        if config.epss.enabled {
            sources.push(Arc::new(EpssSource::new(
                &config.epss.url,
                deps.downloader.clone(),
                deps.queue.clone(),
                deps.tracker.clone(),
            )));
        }
        if config.debian.enabled {
            let interval = i64::try_from(config.debian.interval_hours)
                .ok()
                .and_then(TimeDelta::try_hours)
                .unwrap_or(TimeDelta::MAX);
            sources.push(Arc::new(DebianSource::new(
                &config.debian.url,
                interval,
                deps.downloader.clone(),
                deps.queue.clone(),
                deps.tracker.clone(),
            )));
        }

        sources
    }

    pub fn nvd_settings(section: &NvdSection) -> NvdSettings {
        NvdSettings {
            url: section.url.clone(),
            api_key: section.api_key.clone().filter(|k| !k.trim().is_empty()),
            results_per_page: section.results_per_page,
        }
    }

    /// Limiter sized to the keyed or public NVD budget
    pub fn nvd_rate_limiter(section: &NvdSection) -> RateLimiter {
        RateLimiter::new(
            section.rate_limit(),
            Duration::from_secs(section.rolling_window),
        )
    }

    pub fn nvd_fetcher(section: &NvdSection, client: Arc<dyn PageClient>) -> PaginatedFetcher {
        let retry = RetryPolicy::new(section.retry_limit, Duration::from_secs(section.retry_delay));
        PaginatedFetcher::new(
            client,
            Arc::new(Self::nvd_rate_limiter(section)),
            retry,
            section.max_threads,
        )
    }
}
