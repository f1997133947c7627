//! Source adapters: one per upstream feed
//!
//! Each adapter pairs a pure normaliser (`raw payload -> fragments`) with the
//! freshness decision and status bookkeeping of its feed.

mod cisa;
mod debian;
mod epss;
mod nvd;

pub use cisa::{normalize_kev, CisaSource, KevCatalog, CISA_SOURCE};
pub use debian::{normalize_debian, DebianSource, DEBIAN_SOURCE};
pub use epss::{normalize_epss, EpssScores, EpssSource, EPSS_SOURCE};
pub use nvd::{normalize_nvd_page, NvdSettings, NvdSource, NVD_SOURCE};

use crate::application::services::UpsertQueue;
use crate::ingestion::domain::{VulnerabilityFragment, COLLECTION_CVE, KEY_FIELD_ID};

/// Records per queued write request
pub const FRAGMENT_BATCH_SIZE: usize = 5_000;

/// Hands fragments to the queue in batches of [`FRAGMENT_BATCH_SIZE`]
///
/// Returns the number of fragments enqueued.
pub(crate) fn enqueue_fragments(
    queue: &UpsertQueue,
    fragments: Vec<VulnerabilityFragment>,
) -> usize {
    let total = fragments.len();
    let mut batch = Vec::with_capacity(total.min(FRAGMENT_BATCH_SIZE));

    for fragment in fragments {
        batch.push(fragment.into_document());
        if batch.len() == FRAGMENT_BATCH_SIZE {
            queue.enqueue_merge(COLLECTION_CVE, std::mem::take(&mut batch), KEY_FIELD_ID);
        }
    }
    if !batch.is_empty() {
        queue.enqueue_merge(COLLECTION_CVE, batch, KEY_FIELD_ID);
    }

    total
}
