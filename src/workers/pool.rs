//! Local worker pool backed by tokio tasks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::handlers::HandlerRegistry;
use super::{Completion, WorkItem, WorkerPool};
use crate::error::WorkerError;
use crate::ledger::JobOutcome;

/// Fixed set of named workers. Each submitted job occupies one worker until
/// its handler returns.
pub struct LocalWorkerPool {
    capacity: usize,
    idle: Arc<Mutex<VecDeque<String>>>,
    handlers: Arc<HandlerRegistry>,
    completions: mpsc::Sender<Completion>,
}

impl LocalWorkerPool {
    pub fn new(
        worker_count: usize,
        handlers: HandlerRegistry,
        completions: mpsc::Sender<Completion>,
    ) -> Self {
        let idle: VecDeque<String> = (1..=worker_count).map(|i| format!("worker_{i}")).collect();
        info!(workers = worker_count, handlers = ?handlers.names(), "Worker pool initialized");
        Self {
            capacity: worker_count,
            idle: Arc::new(Mutex::new(idle)),
            handlers: Arc::new(handlers),
            completions,
        }
    }

    fn idle_workers(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn execute(handlers: &HandlerRegistry, item: &WorkItem, worker_id: &str) -> JobOutcome {
        let job = &item.job;
        let Some(handler) = handlers.get(&job.handler) else {
            return JobOutcome::Failed {
                worker_id: worker_id.to_string(),
                error: WorkerError::HandlerNotFound {
                    handler: job.handler.clone(),
                }
                .to_string(),
            };
        };

        info!(
            worker = worker_id,
            job_id = %job.id,
            task_number = job.task_number,
            "Processing job"
        );

        // Run in its own task so a panicking handler still yields an outcome.
        let payload = job.payload.clone();
        let run = tokio::spawn(async move { handler.run(&payload).await });
        match run.await {
            Ok(Ok(data)) => JobOutcome::Succeeded {
                worker_id: worker_id.to_string(),
                data,
            },
            Ok(Err(e)) => JobOutcome::Failed {
                worker_id: worker_id.to_string(),
                error: e.to_string(),
            },
            Err(e) => JobOutcome::Failed {
                worker_id: worker_id.to_string(),
                error: format!("handler task aborted: {e}"),
            },
        }
    }
}

#[async_trait]
impl WorkerPool for LocalWorkerPool {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn available(&self) -> usize {
        self.idle_workers().len()
    }

    async fn submit(&self, item: WorkItem) -> Result<(), WorkerError> {
        let worker_id = self
            .idle_workers()
            .pop_front()
            .ok_or(WorkerError::NoIdleWorker)?;

        let idle = Arc::clone(&self.idle);
        let handlers = Arc::clone(&self.handlers);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let outcome = Self::execute(&handlers, &item, &worker_id).await;
            if let JobOutcome::Failed { error, .. } = &outcome {
                warn!(worker = %worker_id, job_id = %item.job.id, error = %error, "Job failed");
            }

            // Free the worker before reporting so the scheduler sees the capacity.
            idle.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(worker_id);

            let completion = Completion {
                project: item.project,
                job_id: item.job.id,
                outcome,
            };
            if completions.send(completion).await.is_err() {
                warn!(job_id = %item.job.id, "Completion channel closed; result dropped");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Job, JobSpec};
    use serde_json::json;

    fn item(handler: &str, text: &str) -> WorkItem {
        WorkItem {
            project: "default".into(),
            job: Job::planned(
                1,
                JobSpec {
                    handler: handler.into(),
                    payload: json!({"task": handler, "text": text}),
                },
            ),
        }
    }

    #[tokio::test]
    async fn submit_occupies_a_worker_until_done() {
        let (tx, mut rx) = mpsc::channel(8);
        let pool = LocalWorkerPool::new(1, HandlerRegistry::with_builtins(), tx);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.available(), 1);

        let work = item("to_caps", "abc");
        let job_id = work.job.id;
        pool.submit(work).await.unwrap();
        assert!(matches!(
            pool.submit(item("to_caps", "x")).await,
            Err(WorkerError::NoIdleWorker)
        ));

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.job_id, job_id);
        assert_eq!(completion.project, "default");
        match completion.outcome {
            JobOutcome::Succeeded { worker_id, data } => {
                assert_eq!(worker_id, "worker_1");
                assert_eq!(data["result"], "ABC");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn unknown_handler_reports_failure() {
        let (tx, mut rx) = mpsc::channel(8);
        let pool = LocalWorkerPool::new(2, HandlerRegistry::with_builtins(), tx);
        pool.submit(item("sentiment", "meh")).await.unwrap();

        let completion = rx.recv().await.unwrap();
        match completion.outcome {
            JobOutcome::Failed { error, .. } => assert!(error.contains("sentiment")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
