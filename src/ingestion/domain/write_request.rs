use super::document::Document;

/// How the records of a [`WriteRequest`] are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Field-level upsert matched on `key_field`
    Merge { key_field: String },
    /// Plain insert of every record
    Insert,
}

/// A queued write against one collection.
///
/// Lives only in memory between `enqueue` and the writer draining it.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub collection: String,
    pub records: Vec<Document>,
    pub mode: WriteMode,
}

impl WriteRequest {
    pub fn merge(
        collection: impl Into<String>,
        records: Vec<Document>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            records,
            mode: WriteMode::Merge {
                key_field: key_field.into(),
            },
        }
    }

    pub fn insert(collection: impl Into<String>, records: Vec<Document>) -> Self {
        Self {
            collection: collection.into(),
            records,
            mode: WriteMode::Insert,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
