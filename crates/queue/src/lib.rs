//! Periodic jobs for accord.
//!
//! - **Scheduler**: fires the settlement pass once a day at a fixed UTC time
//!   and refuses to start a pass while another is still running
//! - **Executor**: runs scheduled jobs against the core services

pub mod executor;
pub mod scheduler;

pub use executor::SettlementExecutor;
pub use scheduler::{
    JobExecutor, JobRun, ScheduledJob, SchedulerConfig, SchedulerState, SettlementScheduler,
    run_scheduler,
};
