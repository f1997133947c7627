use super::document::{timestamp_value, Document};
use crate::shared::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection holding one status document per source
pub const COLLECTION_UPDATE_STATUS: &str = "update_status";

/// Key field of [`COLLECTION_UPDATE_STATUS`]
pub const KEY_FIELD_DATA_SOURCE: &str = "data_source";

/// Marker field holding the upstream's own versioning signal
pub const FIELD_SOURCE_LAST_UPDATE: &str = "source_last_update";

/// Persisted sync state of one source.
///
/// `last_updated` is wall-clock time of the last successful completion;
/// `source_last_update` is the upstream's own versioning signal (a release
/// date, a score date) when the feed exposes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_last_update: Option<DateTime<Utc>>,
    /// Any other source-specific markers, plus the storage timestamps
    #[serde(flatten)]
    pub extra: Document,
}

impl SourceStatus {
    /// Decodes a status document read back from storage
    pub fn from_document(document: Document) -> Result<Self> {
        let status: SourceStatus = serde_json::from_value(Value::Object(document))?;
        Ok(status)
    }

    /// Marker fields recording the upstream's versioning signal
    pub fn marker(source_last_update: DateTime<Utc>) -> Document {
        let mut markers = Document::new();
        markers.insert(
            FIELD_SOURCE_LAST_UPDATE.to_string(),
            timestamp_value(source_last_update),
        );
        markers
    }
}
