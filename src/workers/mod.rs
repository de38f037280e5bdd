//! Worker-pool collaborator.
//!
//! The orchestrator hands claimed jobs to a `WorkerPool` and receives
//! `Completion` messages back on an mpsc channel. Nothing here knows about
//! ledgers or projects beyond the project name carried for attribution.
//!
//! - `pool`: `LocalWorkerPool`, tokio tasks with a fixed number of workers
//! - `handlers`: `JobHandler` registry and the bundled text handlers

pub mod handlers;
pub mod pool;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::ledger::{Job, JobOutcome};

pub use handlers::{HandlerRegistry, JobHandler};
pub use pool::LocalWorkerPool;

/// A claimed job on its way to a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Project whose ledger owns the job.
    pub project: String,
    pub job: Job,
}

/// Worker callback, delivered over the completion channel.
#[derive(Debug, Clone)]
pub struct Completion {
    pub project: String,
    pub job_id: Uuid,
    pub outcome: JobOutcome,
}

/// Executes jobs out of band.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Total number of workers.
    fn capacity(&self) -> usize;

    /// Workers currently idle.
    fn available(&self) -> usize;

    /// Start executing a job. The outcome arrives later as a `Completion`.
    async fn submit(&self, item: WorkItem) -> Result<(), WorkerError>;
}
