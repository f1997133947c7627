//! Domain policies - rules deciding whether a source is fetched

pub mod freshness_policy;

pub use freshness_policy::{FetchDecision, FetchWindow, FreshnessPolicy};
