//! # Background Job Scheduler
//!
//! Long-running file dumps run on a single low-priority task so the
//! supervisor loop never blocks on I/O. Each pending job is a small
//! state machine; one call to [`BackgroundScheduler::run_step`]
//! advances every active job by at most one bounded step, so the
//! worst-case slice time stays inspectable.

mod dump;
mod scheduler;

pub use dump::{DumpKind, DumpPhase};
pub use scheduler::{BackgroundScheduler, JobId, JobStatus};
