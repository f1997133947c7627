//! Domain models for the ingestion pipeline

pub mod document;
pub mod job;
pub mod source_status;
pub mod write_request;

pub use document::{
    timestamp_value, Document, VulnerabilityFragment, COLLECTION_CVE, KEY_FIELD_ID,
};
pub use job::{JobMode, SourceUpdate, OVERALL_JOB_SOURCE};
pub use source_status::{
    SourceStatus, COLLECTION_UPDATE_STATUS, FIELD_SOURCE_LAST_UPDATE, KEY_FIELD_DATA_SOURCE,
};
pub use write_request::{WriteMode, WriteRequest};
