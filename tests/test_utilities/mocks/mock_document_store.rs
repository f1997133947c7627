use async_trait::async_trait;
use cvemate::ports::outbound::BulkWriteSummary;
use cvemate::prelude::*;
use serde_json::Value;
use std::sync::Mutex;

/// DocumentStore recording every bulk write before delegating to memory
pub struct RecordingDocumentStore {
    inner: InMemoryDocumentStore,
    writes: Mutex<Vec<(String, usize)>>,
}

impl RecordingDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    /// Number of bulk calls made against `collection`
    pub fn write_calls(&self, collection: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == collection)
            .count()
    }

    /// Finds a document of `cve` by identifier
    pub fn cve(&self, id: &str) -> Option<Document> {
        self.inner
            .documents("cve")
            .into_iter()
            .find(|doc| doc.get("id") == Some(&Value::String(id.to_string())))
    }
}

impl Default for RecordingDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for RecordingDocumentStore {
    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteOperation>,
    ) -> Result<BulkWriteSummary> {
        self.writes
            .lock()
            .unwrap()
            .push((collection.to_string(), operations.len()));
        self.inner.bulk_write(collection, operations).await
    }

    async fn find_one(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Document>> {
        self.inner.find_one(collection, key_field, key_value).await
    }

    async fn ensure_index(&self, collection: &str, field: &str) -> Result<bool> {
        self.inner.ensure_index(collection, field).await
    }
}
