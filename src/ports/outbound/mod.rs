//! Outbound ports (Driven ports) - Infrastructure interfaces
//!
//! These ports define the interfaces the pipeline uses to reach upstream
//! feeds and the document store.

pub mod document_store;
pub mod page_client;
pub mod raw_downloader;
pub mod source_adapter;

pub use document_store::{BulkWriteSummary, DocumentStore, WriteOperation};
pub use page_client::{HttpResponse, PageClient, PageRequest};
pub use raw_downloader::RawDownloader;
pub use source_adapter::SourceAdapter;
