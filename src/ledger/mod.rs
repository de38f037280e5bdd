//! Job lifecycle: planned → queued → outstanding → completed.
//!
//! - `job`: Job model, state machine and result records
//! - `ledger`: per-project bookkeeping of jobs by state

pub mod job;
pub mod ledger;

pub use job::{Job, JobCounts, JobOutcome, JobResult, JobSpec, JobState, ResultStatus};
pub use ledger::JobLedger;
