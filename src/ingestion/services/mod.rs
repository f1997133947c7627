//! Domain services - stateless calculations used by the application layer

pub mod page_plan;
pub mod schedule;

pub use page_plan::PagePlan;
pub use schedule::next_run_delay;
