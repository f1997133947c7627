use crate::ingestion::domain::Document;
use crate::shared::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One operation of a bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Update the document matching `{key_field: key_value}`, creating it when
    /// absent. `set` overwrites only the listed top-level fields; `set_on_insert`
    /// is applied only when the document is created.
    Upsert {
        key_field: String,
        key_value: Value,
        set: Document,
        set_on_insert: Document,
    },
    /// Insert a new document unconditionally
    Insert { document: Document },
}

/// Counters reported by a bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl BulkWriteSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// DocumentStore port for the shared storage engine
///
/// All mutation is upsert-style so concurrent callers need no external
/// locking; the engine resolves conflicts per operation.
///
/// # Async Support
/// Implementations must be `Send + Sync`; the upsert queue writer and the
/// status tracker share one instance.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Applies every operation against `collection` in order, as one call
    ///
    /// # Errors
    /// Returns an error if the engine rejects the batch. Whether operations
    /// already applied survive is engine-specific; the SQLite store rolls the
    /// whole call back.
    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteOperation>,
    ) -> Result<BulkWriteSummary>;

    /// Finds the first document whose `key_field` equals `key_value`
    async fn find_one(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Document>>;

    /// Ensures an index on `field` exists
    ///
    /// # Returns
    /// `true` if the index was created, `false` if it already existed
    async fn ensure_index(&self, collection: &str, field: &str) -> Result<bool>;
}
