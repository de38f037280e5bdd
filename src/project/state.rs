//! Per-project runtime state.
//!
//! Everything that changes while a project is in use (ledger, work state,
//! plan metadata) lives in one `ProjectState` behind one mutex. Readers take
//! the same lock, so a snapshot never shows a half-applied transition.

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use super::model::Project;
use crate::ledger::{JobCounts, JobLedger};

/// Whether the scheduler may move queued jobs to workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Playing,
    #[default]
    Paused,
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Where the current plan's results should be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub plan_id: String,
    pub output_file: String,
    pub output_dir: String,
    /// Commit the plan was made against.
    pub source_commit: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProjectState {
    pub ledger: JobLedger,
    pub work_state: WorkState,
    pub current_plan: Option<PlanMetadata>,
}

/// Consistent read of a project's state.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSnapshot {
    pub project: String,
    pub work_state: WorkState,
    pub counts: JobCounts,
    pub task_counter: u64,
    pub current_plan: Option<PlanMetadata>,
}

/// A project together with its lock domain.
#[derive(Debug)]
pub struct ProjectRuntime {
    project: Project,
    state: Mutex<ProjectState>,
    /// Serializes collections so each completed job is written once.
    collect_guard: Mutex<()>,
}

impl ProjectRuntime {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            state: Mutex::new(ProjectState::default()),
            collect_guard: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Acquire the project lock. Do not hold it across collaborator calls.
    pub async fn lock(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().await
    }

    pub async fn begin_collection(&self) -> MutexGuard<'_, ()> {
        self.collect_guard.lock().await
    }

    pub async fn snapshot(&self) -> ProjectSnapshot {
        let state = self.state.lock().await;
        ProjectSnapshot {
            project: self.project.name.clone(),
            work_state: state.work_state,
            counts: state.ledger.counts(),
            task_counter: state.ledger.task_counter(),
            current_plan: state.current_plan.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JobSpec;
    use std::path::PathBuf;

    #[tokio::test]
    async fn starts_paused_and_empty() {
        let runtime = ProjectRuntime::new(Project::new("p", "", PathBuf::from("/tmp/p")));
        let snap = runtime.snapshot().await;
        assert_eq!(snap.work_state, WorkState::Paused);
        assert_eq!(snap.counts, JobCounts::default());
        assert!(snap.current_plan.is_none());
    }

    #[tokio::test]
    async fn snapshot_reflects_locked_mutation() {
        let runtime = ProjectRuntime::new(Project::new("p", "", PathBuf::from("/tmp/p")));
        {
            let mut state = runtime.lock().await;
            state.ledger.plan(vec![JobSpec {
                handler: "to_caps".into(),
                payload: serde_json::json!({"text": "x"}),
            }]);
            state.work_state = WorkState::Playing;
        }
        let snap = runtime.snapshot().await;
        assert_eq!(snap.counts.planned, 1);
        assert_eq!(snap.task_counter, 1);
        assert_eq!(snap.work_state.to_string(), "playing");
    }
}
