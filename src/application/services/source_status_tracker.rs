use crate::ingestion::domain::{
    timestamp_value, Document, SourceStatus, COLLECTION_UPDATE_STATUS, KEY_FIELD_DATA_SOURCE,
};
use crate::ports::outbound::{DocumentStore, WriteOperation};
use crate::shared::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// SourceStatusTracker persists the sync point of every source.
///
/// Writes go straight to the store as single upserts keyed by
/// `data_source`, bypassing the upsert queue, so a status is visible as soon
/// as `record_success` returns.
pub struct SourceStatusTracker {
    store: Arc<dyn DocumentStore>,
}

impl SourceStatusTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Stored status of `source`, or `None` if it never completed
    pub async fn get_status(&self, source: &str) -> Result<Option<SourceStatus>> {
        let document = self
            .store
            .find_one(
                COLLECTION_UPDATE_STATUS,
                KEY_FIELD_DATA_SOURCE,
                &Value::String(source.to_string()),
            )
            .await
            .with_context(|| format!("Failed to read status of source '{}'", source))?;

        document
            .map(SourceStatus::from_document)
            .transpose()
            .with_context(|| format!("Malformed status document for source '{}'", source))
    }

    /// Records a successful completion at the current time
    pub async fn record_success(&self, source: &str, markers: Document) -> Result<()> {
        self.record_success_at(source, markers, Utc::now()).await
    }

    /// Upserts `last_updated = at` plus the given marker fields
    ///
    /// Fields not named in `markers` keep their stored values. Repeating the
    /// call with the same arguments leaves the same document.
    pub async fn record_success_at(
        &self,
        source: &str,
        markers: Document,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut set = markers;
        set.insert("last_updated".to_string(), timestamp_value(at));
        set.remove(KEY_FIELD_DATA_SOURCE);

        let operation = WriteOperation::Upsert {
            key_field: KEY_FIELD_DATA_SOURCE.to_string(),
            key_value: Value::String(source.to_string()),
            set,
            set_on_insert: Document::new(),
        };

        self.store
            .bulk_write(COLLECTION_UPDATE_STATUS, vec![operation])
            .await
            .with_context(|| format!("Failed to record status of source '{}'", source))?;

        tracing::debug!(source, last_updated = %at, "Recorded source status");
        Ok(())
    }
}
