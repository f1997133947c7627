use crate::ingestion::domain::{JobMode, SourceUpdate};
use crate::shared::Result;
use async_trait::async_trait;

/// SourceAdapter port - one upstream feed
///
/// An adapter decides whether its feed needs fetching, normalizes the raw
/// payload into fragments, hands them to the upsert queue and records its
/// status. The job runner calls adapters one after another.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source name, also the status key in `update_status`
    fn name(&self) -> &str;

    /// Runs one update pass
    ///
    /// # Errors
    /// Any error aborts this source for the current job only.
    async fn update(&self, mode: JobMode) -> Result<SourceUpdate>;
}
