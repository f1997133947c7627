//! Job scheduling and daemon loop

mod job_scheduler;

pub use job_scheduler::{JobScheduler, SchedulerSettings};
