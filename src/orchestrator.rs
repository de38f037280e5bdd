//! Orchestrator: one method per command, over the components.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::collect::{CollectMode, CollectionCoordinator, CollectionRecord};
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::ledger::{Job, JobState};
use crate::plans::{FileListing, PlanCatalog, PlanRegistry, PlanSignature, PlanStub};
use crate::project::{
    PlanMetadata, Project, ProjectListing, ProjectStore, SwitchOutcome, WorkState,
};
use crate::vcs::{ConsistencyGate, GitStatus, VersionControl};
use crate::workers::{Completion, WorkerPool};

/// What a successful `plan` added to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub count: usize,
    /// Last task number issued in the project.
    pub task_counter: u64,
}

/// Everything a polling client shows. Project-scoped fields are `None`
/// while a switch is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub work_state: Option<WorkState>,
    pub planned_jobs: Option<usize>,
    pub queued_jobs: Option<usize>,
    pub outstanding_jobs: Option<usize>,
    pub completed_jobs: Option<usize>,
    pub idle_workers: usize,
    pub tasked_workers: usize,
    pub task_counter: Option<u64>,
    pub current_plan: Option<PlanMetadata>,
    pub current_project: Option<String>,
    pub switch_in_progress: bool,
}

/// Jobs of the active project, per state.
#[derive(Debug, Clone, Serialize)]
pub struct JobsByState {
    pub planned: Vec<Job>,
    pub queued: Vec<Job>,
    pub outstanding: Vec<Job>,
    pub completed: Vec<Job>,
}

/// `jobs` is `None` while a switch is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub current_project: Option<String>,
    pub switch_in_progress: bool,
    pub jobs: Option<JobsByState>,
}

pub struct Orchestrator {
    config: ServerConfig,
    projects: Arc<ProjectStore>,
    plans: PlanRegistry,
    gate: Arc<ConsistencyGate>,
    dispatcher: Arc<Dispatcher>,
    collector: CollectionCoordinator,
}

impl Orchestrator {
    /// Open the project registry and wire the components to their collaborators.
    pub async fn new(
        config: ServerConfig,
        vcs: Arc<dyn VersionControl>,
        catalog: Arc<dyn PlanCatalog>,
        pool: Arc<dyn WorkerPool>,
    ) -> Result<Self> {
        let projects = Arc::new(ProjectStore::open(&config.data_dir).await?);
        let gate = Arc::new(ConsistencyGate::new(vcs, config.git_status_cache_ttl));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&projects),
            Arc::clone(&gate),
            pool,
        ));
        let collector = CollectionCoordinator::new(
            Arc::clone(&projects),
            Arc::clone(&gate),
            config.data_dir.clone(),
        );

        Ok(Self {
            config,
            projects,
            plans: PlanRegistry::new(catalog),
            gate,
            dispatcher,
            collector,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the scheduling loop and the completion funnel.
    pub fn start(&self, completions: mpsc::Receiver<Completion>) -> Vec<JoinHandle<()>> {
        vec![
            self.dispatcher
                .spawn_scheduling_loop(self.config.tick_interval),
            self.dispatcher.spawn_completion_funnel(completions),
        ]
    }

    // ── Ledger ──────────────────────────────────────────────────────────

    /// Instantiate a plan into planned jobs. Requires a clean workspace.
    pub async fn plan(
        &self,
        plan_id: &str,
        inputs: &HashMap<String, String>,
    ) -> Result<PlanSummary> {
        self.projects.active().await?;
        let plan = self.plans.validate(plan_id, inputs).await?;
        let status = self.gate.require_clean("plan").await?;
        let specs = self.plans.instantiate(&plan, inputs).await?;

        // Re-resolve: the active project may have changed while we were out.
        let runtime = self.projects.active().await?;
        let mut state = runtime.lock().await;
        let count = state.ledger.plan(specs);
        state.current_plan = Some(PlanMetadata {
            plan_id: plan.id.clone(),
            output_file: plan.output_file.clone(),
            output_dir: plan.output_dir.clone(),
            source_commit: Some(status.current_commit.hash),
        });

        info!(project = runtime.name(), plan = %plan.id, count, "Planned jobs");
        Ok(PlanSummary {
            plan_id: plan.id,
            count,
            task_counter: state.ledger.task_counter(),
        })
    }

    pub async fn flush_planned(&self) -> Result<usize> {
        let runtime = self.projects.active().await?;
        let removed = runtime.lock().await.ledger.flush_planned();
        Ok(removed)
    }

    pub async fn flush_queued(&self) -> Result<usize> {
        let runtime = self.projects.active().await?;
        let removed = runtime.lock().await.ledger.flush_queued();
        Ok(removed)
    }

    /// Discard completed jobs without collecting them.
    pub async fn reset(&self) -> Result<usize> {
        let runtime = self.projects.active().await?;
        let removed = runtime.lock().await.ledger.reset();
        Ok(removed)
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    pub async fn dispatch(&self) -> Result<usize> {
        self.dispatcher.dispatch().await
    }

    pub async fn play(&self) -> Result<WorkState> {
        self.dispatcher.set_work_state(WorkState::Playing).await
    }

    pub async fn pause(&self) -> Result<WorkState> {
        self.dispatcher.set_work_state(WorkState::Paused).await
    }

    // ── Collection ──────────────────────────────────────────────────────

    pub async fn collect(&self, label: Option<&str>, mode: CollectMode) -> Result<CollectionRecord> {
        self.collector.collect(label, mode).await
    }

    pub async fn collections(&self) -> Result<Vec<CollectionRecord>> {
        self.collector.records().await
    }

    // ── Read-only ───────────────────────────────────────────────────────

    pub async fn status(&self) -> StatusSnapshot {
        let idle_workers = self.dispatcher.idle_workers();
        let tasked_workers = self.dispatcher.tasked_workers();

        let Ok(runtime) = self.projects.active().await else {
            return StatusSnapshot {
                work_state: None,
                planned_jobs: None,
                queued_jobs: None,
                outstanding_jobs: None,
                completed_jobs: None,
                idle_workers,
                tasked_workers,
                task_counter: None,
                current_plan: None,
                current_project: None,
                switch_in_progress: true,
            };
        };

        let snap = runtime.snapshot().await;
        StatusSnapshot {
            work_state: Some(snap.work_state),
            planned_jobs: Some(snap.counts.planned),
            queued_jobs: Some(snap.counts.queued),
            outstanding_jobs: Some(snap.counts.outstanding),
            completed_jobs: Some(snap.counts.completed),
            idle_workers,
            tasked_workers,
            task_counter: Some(snap.task_counter),
            current_plan: snap.current_plan,
            current_project: Some(snap.project),
            switch_in_progress: false,
        }
    }

    pub async fn jobs(&self) -> JobListing {
        let Ok(runtime) = self.projects.active().await else {
            return JobListing {
                current_project: None,
                switch_in_progress: true,
                jobs: None,
            };
        };

        let state = runtime.lock().await;
        let ledger = &state.ledger;
        JobListing {
            current_project: Some(runtime.name().to_string()),
            switch_in_progress: false,
            jobs: Some(JobsByState {
                planned: ledger.jobs_in(JobState::Planned),
                queued: ledger.jobs_in(JobState::Queued),
                outstanding: ledger.jobs_in(JobState::Outstanding),
                completed: ledger.jobs_in(JobState::Completed),
            }),
        }
    }

    pub async fn plans(&self) -> Result<Vec<PlanSignature>> {
        Ok(self.plans.list().await?)
    }

    pub async fn create_plan(&self, name: &str) -> Result<PlanStub> {
        Ok(self.plans.create_stub(name).await?)
    }

    pub async fn files(&self) -> Result<FileListing> {
        Ok(self.plans.files().await?)
    }

    /// Status for display; may be served from a short-lived cache.
    pub async fn git_status(&self) -> Result<GitStatus> {
        Ok(self.gate.cached_status().await?)
    }

    // ── Projects ────────────────────────────────────────────────────────

    pub async fn projects(&self) -> ProjectListing {
        self.projects.list().await
    }

    pub async fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        self.gate.require_clean("creating a project").await?;
        Ok(self.projects.create(name, description).await?)
    }

    pub async fn switch_project(&self, name: &str) -> Result<SwitchOutcome> {
        self.gate.require_clean("switching projects").await?;
        let outcome = self.projects.switch(name).await?;
        self.dispatcher.wake();
        Ok(outcome)
    }
}
