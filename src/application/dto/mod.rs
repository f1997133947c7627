//! Data Transfer Objects for application layer
//!
//! DTOs carry requests into the fetch engine and job results back out,
//! keeping the domain layer isolated.

mod fetch_request;
mod job_report;

pub use fetch_request::{FetchRequest, PageLayout};
pub use job_report::{JobReport, SourceOutcome, SourceResult};
