//! Mock implementations for testing

mod mock_document_store;
mod mock_downloader;
mod mock_page_client;

pub use mock_document_store::RecordingDocumentStore;
pub use mock_downloader::MockDownloader;
pub use mock_page_client::{nvd_record, MockPageClient};
