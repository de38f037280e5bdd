use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::ledger::JobOutcome;
use crate::project::{ProjectStore, WorkState};
use crate::vcs::ConsistencyGate;
use crate::workers::{Completion, WorkItem, WorkerPool};

/// Worker id recorded when a job never reached a worker.
const UNASSIGNED_WORKER: &str = "unassigned";

pub struct Dispatcher {
    projects: Arc<ProjectStore>,
    gate: Arc<ConsistencyGate>,
    pool: Arc<dyn WorkerPool>,
    wake: Notify,
}

impl Dispatcher {
    pub fn new(
        projects: Arc<ProjectStore>,
        gate: Arc<ConsistencyGate>,
        pool: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            projects,
            gate,
            pool,
            wake: Notify::new(),
        }
    }

    pub fn idle_workers(&self) -> usize {
        self.pool.available()
    }

    pub fn tasked_workers(&self) -> usize {
        self.pool.capacity().saturating_sub(self.pool.available())
    }

    /// Run the scheduling loop now instead of at the next tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Toggle the active project's work state. Outstanding jobs are never cancelled.
    pub async fn set_work_state(&self, work_state: WorkState) -> Result<WorkState> {
        let runtime = self.projects.active().await?;
        runtime.lock().await.work_state = work_state;
        info!(project = runtime.name(), %work_state, "Work state changed");
        self.wake();
        Ok(work_state)
    }

    /// Promote every planned job to queued. Requires a clean workspace.
    pub async fn dispatch(&self) -> Result<usize> {
        let runtime = self.projects.active().await?;
        if runtime.lock().await.ledger.counts().planned == 0 {
            return Err(LedgerError::NothingPlanned.into());
        }

        // Lock released while the versioning collaborator answers.
        self.gate.require_clean("dispatch").await?;

        let moved = runtime.lock().await.ledger.promote_planned()?;
        info!(project = runtime.name(), moved, "Dispatched planned jobs");
        self.wake();
        Ok(moved)
    }

    /// One scheduling pass: claim up to the pool's idle capacity and submit.
    ///
    /// Returns how many jobs reached a worker.
    pub async fn tick(&self) -> usize {
        let runtime = match self.projects.active().await {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("Project switch in progress; skipping tick");
                return 0;
            }
        };

        let capacity = self.pool.available();
        if capacity == 0 {
            return 0;
        }

        let claimed = {
            let mut state = runtime.lock().await;
            if state.work_state != WorkState::Playing {
                return 0;
            }
            state.ledger.claim(capacity)
        };
        if claimed.is_empty() {
            return 0;
        }

        let project = runtime.name().to_string();
        let submissions = claimed.into_iter().map(|job| {
            let item = WorkItem {
                project: project.clone(),
                job,
            };
            async move {
                let job_id = item.job.id;
                (job_id, self.pool.submit(item).await)
            }
        });

        let mut submitted = 0;
        let mut rejected = Vec::new();
        for (job_id, result) in join_all(submissions).await {
            match result {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!(project = %project, job_id = %job_id, error = %e, "Worker pool rejected job");
                    rejected.push((job_id, e));
                }
            }
        }

        // Rejected jobs are already outstanding; record the failure as their result.
        if !rejected.is_empty() {
            let mut state = runtime.lock().await;
            for (job_id, e) in rejected {
                let outcome = JobOutcome::Failed {
                    worker_id: UNASSIGNED_WORKER.to_string(),
                    error: e.to_string(),
                };
                if let Err(e) = state.ledger.mark_completed(job_id, outcome) {
                    warn!(job_id = %job_id, error = %e, "Could not record rejected job");
                }
            }
        }

        debug!(project = runtime.name(), submitted, "Scheduling tick");
        submitted
    }

    /// Apply a worker callback to the ledger of the project that claimed the job.
    ///
    /// Late or duplicate completions are logged and dropped.
    pub async fn apply_completion(&self, completion: Completion) {
        let Completion {
            project,
            job_id,
            outcome,
        } = completion;

        let Some(runtime) = self.projects.runtime(&project).await else {
            warn!(project = %project, job_id = %job_id, "Completion for unknown project dropped");
            return;
        };

        let applied = runtime.lock().await.ledger.mark_completed(job_id, outcome);
        match applied {
            Ok(()) => debug!(project = %project, job_id = %job_id, "Job completed"),
            Err(e) => warn!(
                project = %project,
                job_id = %job_id,
                error = %e,
                "Dropping late or duplicate completion"
            ),
        }
        self.wake();
    }

    /// Claim and submit on every tick, or sooner when woken.
    pub fn spawn_scheduling_loop(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(tick_ms = tick.as_millis() as u64, "Scheduling loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = dispatcher.wake.notified() => {}
                }
                dispatcher.tick().await;
            }
        })
    }

    /// Funnel worker completions into the ledgers, one at a time.
    pub fn spawn_completion_funnel(
        self: &Arc<Self>,
        mut completions: mpsc::Receiver<Completion>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(completion) = completions.recv().await {
                dispatcher.apply_completion(completion).await;
            }
            info!("Completion channel closed");
        })
    }
}
