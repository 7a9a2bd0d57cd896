//! Adaptive periodic-job scheduler.
//!
//! Scheduler config items describe jobs; the [`SchedulerController`] turns
//! them into live timers on the tokio runtime, recomputes intervals from the
//! refresh backlog and keeps the set of running jobs consistent with pending
//! work.
//!
//! # Architecture
//!
//! - **tasks**: job IDs and the table of callable targets
//! - **jobs**: live timers with a per-name in-flight guard
//! - **backlog**: library, provider and job-history interfaces
//! - **controller**: start/stop/restart state machine and consistency sweep
//! - **timefmt**: relative time strings for logs and summaries

pub mod backlog;
pub mod controller;
pub mod jobs;
pub mod tasks;
pub mod timefmt;

pub use backlog::{
    BacklogKind, BacklogSource, BacklogStatus, JobHistory, MemoryBacklog, MemoryJobHistory,
    PendingCounts, ProviderStatus, StaticProviders,
};
pub use controller::{
    ControllerBuilder, ScheduleOutcome, SchedulerCommand, SchedulerController, estimate_next_run,
    refresh_interval_minutes,
};
pub use jobs::{JobRegistry, JobSnapshot};
pub use tasks::{JobCallback, TargetTable};
pub use timefmt::{ago, next_run_in};
