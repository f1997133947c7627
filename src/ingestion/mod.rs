//! Ingestion domain layer - pure models and decision logic
//!
//! Nothing in here performs I/O or touches the clock; callers pass `now`
//! explicitly so every rule is testable without a runtime.

pub mod domain;
pub mod policies;
pub mod services;
