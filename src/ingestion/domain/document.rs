use crate::shared::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Collection holding one merged document per vulnerability identifier
pub const COLLECTION_CVE: &str = "cve";

/// Field every source uses as its merge key in [`COLLECTION_CVE`]
pub const KEY_FIELD_ID: &str = "id";

/// Field names owned by the persistence layer, never by a source
pub const RESERVED_FIELDS: [&str; 3] = [KEY_FIELD_ID, "created_at", "updated_at"];

/// Stored representation of a timestamp (RFC 3339, UTC, millisecond precision)
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// One source's contribution to a vulnerability record.
///
/// The fragment is turned into `{ "id": <id>, <source_field>: <data> }`, so a
/// field-level merge can only ever replace this source's own subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct VulnerabilityFragment {
    id: String,
    source_field: String,
    data: Value,
}

impl VulnerabilityFragment {
    pub fn new(id: impl Into<String>, source_field: impl Into<String>, data: Value) -> Result<Self> {
        let id = id.into();
        let source_field = source_field.into();

        if id.trim().is_empty() {
            anyhow::bail!("Vulnerability identifier cannot be empty");
        }
        if source_field.is_empty() || source_field.contains('.') || source_field.starts_with('$') {
            anyhow::bail!(
                "Invalid source field '{}': must be a non-empty plain field name",
                source_field
            );
        }
        if RESERVED_FIELDS.contains(&source_field.as_str()) {
            anyhow::bail!(
                "Source field '{}' is reserved for the persistence layer",
                source_field
            );
        }

        Ok(Self {
            id,
            source_field,
            data,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_field(&self) -> &str {
        &self.source_field
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Converts the fragment into the record shape handed to the upsert queue
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        document.insert(KEY_FIELD_ID.to_string(), Value::String(self.id));
        document.insert(self.source_field, self.data);
        document
    }
}
