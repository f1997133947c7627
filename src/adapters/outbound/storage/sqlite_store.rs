//! SQLite-backed DocumentStore.
//!
//! Every collection is a table `<prefix><collection>` in a single WAL-mode
//! database file, one row per document:
//!
//! ```text
//! key      TEXT PRIMARY KEY   upsert key value (generated for plain inserts)
//! doc      TEXT               the document as JSON
//! revision INTEGER            0 on insert, bumped by every later upsert
//! ```

use crate::ingestion::domain::Document;
use crate::ports::outbound::{BulkWriteSummary, DocumentStore, WriteOperation};
use crate::shared::error::IngestError;
use crate::shared::security::{prepare_storage_dir, validate_not_symlink};
use crate::shared::Result;
use async_trait::async_trait;
use dashmap::DashSet;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// File name of the database inside the storage directory
pub const DATABASE_FILE_NAME: &str = "cvemate.db";

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SqliteDocumentStore adapter implementing the DocumentStore port
///
/// Upserts follow `$set` / `$setOnInsert` semantics: on conflict only the
/// top-level fields listed in `set` are replaced (through `json_set`), and
/// `set_on_insert` is written only when the row is created. Each bulk call
/// runs in one transaction, so a rejected batch leaves nothing behind.
///
/// A collection is keyed by the field its upserts use; documents written
/// with [`WriteOperation::Insert`] get a fresh UUID key.
///
/// # Security
/// The storage directory and the database file must not be symbolic links.
/// Collection, prefix and field names are restricted to ASCII letters,
/// digits and `_` before they reach any SQL text.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    prefix: String,
    tables: Arc<DashSet<String>>,
}

impl SqliteDocumentStore {
    /// Opens (creating if needed) the storage directory and its database
    pub async fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let prefix = prefix.into();
        if !prefix.is_empty() && !is_identifier(&prefix) {
            anyhow::bail!(
                "Invalid storage prefix '{}': use ASCII letters, digits and '_'",
                prefix
            );
        }

        prepare_storage_dir(&dir)?;
        let path = database_path(&dir);
        if path.is_symlink() || path.exists() {
            validate_not_symlink(&path, "open database")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| storage_error("*", format!("Failed to open {}: {}", path.display(), e)))?;

        tracing::debug!(database = %path.display(), prefix = %prefix, "Opened document store");

        Ok(Self {
            pool,
            prefix,
            tables: Default::default(),
        })
    }

    /// Number of documents in a collection (0 when it does not exist)
    pub async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.ensure_table(collection).await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error(collection, e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Validated table name of a collection, creating the table on first use
    async fn ensure_table(&self, collection: &str) -> Result<String> {
        let table = format!("{}{}", self.prefix, collection);
        if !is_identifier(&table) {
            return Err(storage_error(
                collection,
                "collection names may only contain ASCII letters, digits and '_'",
            ));
        }
        if self.tables.contains(&table) {
            return Ok(table);
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  key TEXT PRIMARY KEY,\n  doc TEXT NOT NULL,\n  revision INTEGER NOT NULL DEFAULT 0\n)",
            table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error(collection, e))?;

        self.tables.insert(table.clone());
        Ok(table)
    }
}

pub fn database_path(dir: &Path) -> PathBuf {
    dir.join(DATABASE_FILE_NAME)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn storage_error(collection: &str, details: impl Display) -> anyhow::Error {
    IngestError::StorageError {
        collection: collection.to_string(),
        details: details.to_string(),
    }
    .into()
}

/// Row key of an upsert value: strings as-is, anything else as JSON text
fn row_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON path selecting the top-level `field`
fn field_path(collection: &str, field: &str) -> Result<String> {
    if field.is_empty() || field.contains('"') {
        return Err(storage_error(
            collection,
            format!("Unsupported field name '{}'", field),
        ));
    }
    Ok(format!("$.\"{}\"", field))
}

/// `json_extract` over an indexable field, inlined so it matches the index
fn extract_expr(collection: &str, field: &str) -> Result<String> {
    if !is_identifier(field) {
        return Err(storage_error(
            collection,
            format!("Unsupported key field '{}'", field),
        ));
    }
    Ok(format!("json_extract(doc, '$.\"{}\"')", field))
}

fn upsert_sql(table: &str, set_fields: usize) -> String {
    let update = if set_fields == 0 {
        "revision = revision + 1".to_string()
    } else {
        let pairs: Vec<String> = (0..set_fields)
            .map(|i| format!("?{}, json(?{})", 3 + 2 * i, 4 + 2 * i))
            .collect();
        format!(
            "doc = json_set(doc, {}), revision = revision + 1",
            pairs.join(", ")
        )
    };
    format!(
        "INSERT INTO \"{}\" (key, doc) VALUES (?1, ?2)\nON CONFLICT(key) DO UPDATE SET {}\nRETURNING revision",
        table, update
    )
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteOperation>,
    ) -> Result<BulkWriteSummary> {
        let table = self.ensure_table(collection).await?;
        let insert_sql = format!("INSERT INTO \"{}\" (key, doc) VALUES (?1, ?2)", table);
        let mut summary = BulkWriteSummary::default();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error(collection, e))?;

        for operation in operations {
            match operation {
                WriteOperation::Upsert {
                    key_field,
                    key_value,
                    set,
                    set_on_insert,
                } => {
                    let key = row_key(&key_value);

                    let mut inserted = Document::new();
                    inserted.insert(key_field, key_value);
                    inserted.extend(set_on_insert);
                    for (field, value) in &set {
                        inserted.insert(field.clone(), value.clone());
                    }

                    let sql = upsert_sql(&table, set.len());
                    let mut query = sqlx::query_scalar::<_, i64>(&sql)
                        .bind(key)
                        .bind(serde_json::to_string(&inserted)?);
                    for (field, value) in &set {
                        query = query
                            .bind(field_path(collection, field)?)
                            .bind(serde_json::to_string(value)?);
                    }

                    let revision = query
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| storage_error(collection, e))?;
                    if revision == 0 {
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                WriteOperation::Insert { document } => {
                    sqlx::query(&insert_sql)
                        .bind(Uuid::new_v4().to_string())
                        .bind(serde_json::to_string(&document)?)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| storage_error(collection, e))?;
                    summary.inserted += 1;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| storage_error(collection, e))?;
        Ok(summary)
    }

    async fn find_one(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Document>> {
        let table = self.ensure_table(collection).await?;
        let sql = format!(
            "SELECT doc FROM \"{}\" WHERE {} = json_extract(?1, '$') ORDER BY rowid LIMIT 1",
            table,
            extract_expr(collection, key_field)?
        );

        let row = sqlx::query(&sql)
            .bind(key_value.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error(collection, e))?;

        match row {
            Some(row) => {
                let doc: String = row.get("doc");
                let document = serde_json::from_str(&doc)
                    .map_err(|e| storage_error(collection, format!("Malformed document: {}", e)))?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn ensure_index(&self, collection: &str, field: &str) -> Result<bool> {
        let table = self.ensure_table(collection).await?;
        let expr = extract_expr(collection, field)?;
        let index = format!("{}_{}_idx", table, field);

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1")
                .bind(&index)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| storage_error(collection, e))?;
        if existing > 0 {
            return Ok(false);
        }

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
            index, table, expr
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error(collection, e))?;

        tracing::debug!(collection, field, index = %index, "Created index");
        Ok(true)
    }
}
