//! Job model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Produced by a plan, not yet dispatched.
    Planned,
    /// Dispatched and waiting for a worker.
    Queued,
    /// Handed to a worker.
    Outstanding,
    /// Worker reported back; result held until collection.
    Completed,
}

impl JobState {
    /// Transitions only ever move forward one step.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Planned, Queued) | (Queued, Outstanding) | (Outstanding, Completed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Queued => "queued",
            Self::Outstanding => "outstanding",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Handler and payload for one job, as produced by plan instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub handler: String,
    pub payload: serde_json::Value,
}

/// One unit of dispatchable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub task_number: u64,
    /// Identifies the executor that will run this job.
    pub handler: String,
    /// Opaque to the orchestrator.
    pub payload: serde_json::Value,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a planned job.
    pub fn planned(task_number: u64, spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_number,
            handler: spec.handler,
            payload: spec.payload,
            state: JobState::Planned,
            created_at: Utc::now(),
        }
    }

    /// Advance to the next lifecycle state.
    pub(crate) fn advance(&mut self, target: JobState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "job {} cannot go from {} to {}",
            self.id,
            self.state,
            target
        );
        self.state = target;
    }
}

/// How a job finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// What a worker reported for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded {
        worker_id: String,
        data: serde_json::Value,
    },
    Failed {
        worker_id: String,
        error: String,
    },
}

/// Result record attached to a completed job and written at collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub task_number: u64,
    pub handler: String,
    pub status: ResultStatus,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn from_outcome(job: &Job, outcome: JobOutcome) -> Self {
        let (status, worker_id, result_data, error) = match outcome {
            JobOutcome::Succeeded { worker_id, data } => {
                (ResultStatus::Completed, worker_id, Some(data), None)
            }
            JobOutcome::Failed { worker_id, error } => {
                (ResultStatus::Failed, worker_id, None, Some(error))
            }
        };
        Self {
            job_id: job.id,
            task_number: job.task_number,
            handler: job.handler.clone(),
            status,
            worker_id,
            result_data,
            error,
            completed_at: Utc::now(),
        }
    }
}

/// Point-in-time count of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub planned: usize,
    pub queued: usize,
    pub outstanding: usize,
    pub completed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.planned + self.queued + self.outstanding + self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            handler: "to_caps".into(),
            payload: serde_json::json!({"task": "to_caps", "text": "hi"}),
        }
    }

    #[test]
    fn forward_transitions_only() {
        assert!(JobState::Planned.can_transition_to(JobState::Queued));
        assert!(JobState::Queued.can_transition_to(JobState::Outstanding));
        assert!(JobState::Outstanding.can_transition_to(JobState::Completed));

        assert!(!JobState::Planned.can_transition_to(JobState::Outstanding));
        assert!(!JobState::Queued.can_transition_to(JobState::Planned));
        assert!(!JobState::Completed.can_transition_to(JobState::Outstanding));
        assert!(!JobState::Outstanding.can_transition_to(JobState::Queued));
    }

    #[test]
    fn job_walks_the_lifecycle() {
        let mut job = Job::planned(1, spec());
        assert_eq!(job.state, JobState::Planned);
        job.advance(JobState::Queued);
        job.advance(JobState::Outstanding);
        job.advance(JobState::Completed);
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn failed_outcome_keeps_error() {
        let job = Job::planned(7, spec());
        let result = JobResult::from_outcome(
            &job,
            JobOutcome::Failed {
                worker_id: "worker_1".into(),
                error: "boom".into(),
            },
        );
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.task_number, 7);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.result_data.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("result_data").is_none());
    }

    #[test]
    fn job_state_display() {
        assert_eq!(JobState::Outstanding.to_string(), "outstanding");
        assert_eq!(
            serde_json::to_string(&JobState::Planned).unwrap(),
            "\"planned\""
        );
    }
}
