use crate::ingestion::domain::Document;
use crate::ports::outbound::{BulkWriteSummary, DocumentStore, WriteOperation};
use crate::shared::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Contents of one collection.
///
/// `lookup` maps a field name to `value -> position` for every field that has
/// been used as an upsert key or declared through `ensure_index`. Only the
/// first document carrying a value is indexed, matching `find_one`.
#[derive(Debug, Default)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: BTreeSet<String>,
    lookup: HashMap<String, HashMap<String, usize>>,
}

fn index_key(value: &Value) -> String {
    value.to_string()
}

impl CollectionData {
    fn build_lookup(&mut self, field: &str) {
        if self.lookup.contains_key(field) {
            return;
        }
        let mut positions = HashMap::new();
        for (position, document) in self.documents.iter().enumerate() {
            if let Some(value) = document.get(field) {
                positions.entry(index_key(value)).or_insert(position);
            }
        }
        self.lookup.insert(field.to_string(), positions);
    }

    fn position_of(&mut self, field: &str, value: &Value) -> Option<usize> {
        self.build_lookup(field);
        self.lookup
            .get(field)
            .and_then(|positions| positions.get(&index_key(value)))
            .copied()
    }

    /// Registers `position` under every looked-up field it carries
    fn reindex(&mut self, position: usize) {
        let document = &self.documents[position];
        for (field, positions) in self.lookup.iter_mut() {
            if let Some(value) = document.get(field) {
                positions.entry(index_key(value)).or_insert(position);
            }
        }
    }

    fn upsert(
        &mut self,
        key_field: &str,
        key_value: Value,
        set: Document,
        set_on_insert: Document,
    ) -> bool {
        match self.position_of(key_field, &key_value) {
            Some(position) => {
                let document = &mut self.documents[position];
                for (field, value) in set {
                    document.insert(field, value);
                }
                self.reindex(position);
                false
            }
            None => {
                let mut document = Document::new();
                document.insert(key_field.to_string(), key_value);
                for (field, value) in set_on_insert {
                    document.insert(field, value);
                }
                for (field, value) in set {
                    document.insert(field, value);
                }
                self.documents.push(document);
                self.reindex(self.documents.len() - 1);
                true
            }
        }
    }

    fn insert(&mut self, document: Document) {
        self.documents.push(document);
        self.reindex(self.documents.len() - 1);
    }

    fn find_one(&mut self, key_field: &str, key_value: &Value) -> Option<Document> {
        self.position_of(key_field, key_value)
            .map(|position| self.documents[position].clone())
    }
}

/// InMemoryDocumentStore adapter implementing the DocumentStore port
///
/// Collections live in a `DashMap`; a bulk write holds the collection's
/// entry for its whole duration, so every bulk call is applied atomically
/// with respect to other callers on the same collection.
///
/// Upserts follow `$set` / `$setOnInsert` semantics: only top-level fields
/// present in `set` are replaced, `set_on_insert` is written only when the
/// document is created.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<DashMap<String, CollectionData>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (0 when it does not exist)
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|data| data.documents.len())
            .unwrap_or(0)
    }

    /// Copy of every document in a collection, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|data| data.documents.clone())
            .unwrap_or_default()
    }

    fn apply(
        &self,
        collection: &str,
        operations: Vec<WriteOperation>,
    ) -> BulkWriteSummary {
        let mut data = self.collections.entry(collection.to_string()).or_default();
        let mut summary = BulkWriteSummary::default();

        for operation in operations {
            match operation {
                WriteOperation::Upsert {
                    key_field,
                    key_value,
                    set,
                    set_on_insert,
                } => {
                    if data.upsert(&key_field, key_value, set, set_on_insert) {
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                WriteOperation::Insert { document } => {
                    data.insert(document);
                    summary.inserted += 1;
                }
            }
        }

        summary
    }

    fn add_index(&self, collection: &str, field: &str) -> bool {
        let mut data = self.collections.entry(collection.to_string()).or_default();
        data.build_lookup(field);
        data.indexes.insert(field.to_string())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteOperation>,
    ) -> Result<BulkWriteSummary> {
        Ok(self.apply(collection, operations))
    }

    async fn find_one(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Document>> {
        let Some(mut data) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(data.find_one(key_field, key_value))
    }

    async fn ensure_index(&self, collection: &str, field: &str) -> Result<bool> {
        Ok(self.add_index(collection, field))
    }
}
