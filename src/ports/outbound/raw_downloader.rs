use crate::shared::Result;
use async_trait::async_trait;

/// RawDownloader port for single-file feeds (KEV catalog, EPSS CSV, Debian tracker)
///
/// # Errors
/// Implementations return an error for transport failures and for any
/// non-2xx status; single-file downloads are not retried.
#[async_trait]
pub trait RawDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}
