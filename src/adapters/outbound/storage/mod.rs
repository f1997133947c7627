//! Storage adapters implementing the DocumentStore port

mod memory_store;
mod sqlite_store;

pub use memory_store::InMemoryDocumentStore;
pub use sqlite_store::{database_path, SqliteDocumentStore, DATABASE_FILE_NAME};
