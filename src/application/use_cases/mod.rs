//! Use cases module containing application business logic orchestration

mod run_ingestion_job;

pub use run_ingestion_job::RunIngestionJobUseCase;
