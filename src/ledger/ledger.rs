//! Per-project job ledger.
//!
//! The ledger is a plain data structure; callers serialize access to it
//! through the owning project's lock, which is what makes `counts()` a
//! consistent snapshot.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};
use uuid::Uuid;

use super::job::{Job, JobCounts, JobOutcome, JobResult, JobSpec, JobState};
use crate::error::LedgerError;

/// A completed job and its result.
#[derive(Debug, Clone)]
struct CompletedJob {
    job: Job,
    result: JobResult,
}

/// Jobs of one project, bucketed by lifecycle state.
#[derive(Debug, Default)]
pub struct JobLedger {
    planned: VecDeque<Job>,
    queued: VecDeque<Job>,
    outstanding: HashMap<Uuid, Job>,
    completed: HashMap<Uuid, CompletedJob>,
    /// Last task number issued. Never reset, so numbers stay unique per project.
    task_counter: u64,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append planned jobs for one plan instantiation.
    ///
    /// Task numbers continue from the last one issued and are contiguous
    /// within the batch. Returns the number of jobs added.
    pub fn plan(&mut self, specs: Vec<JobSpec>) -> usize {
        let count = specs.len();
        for spec in specs {
            self.task_counter += 1;
            self.planned.push_back(Job::planned(self.task_counter, spec));
        }
        debug!(count, task_counter = self.task_counter, "Planned jobs");
        count
    }

    /// Discard all planned jobs.
    pub fn flush_planned(&mut self) -> usize {
        let removed = self.planned.len();
        self.planned.clear();
        if removed > 0 {
            info!(removed, "Flushed planned jobs");
        }
        removed
    }

    /// Discard all queued jobs. Outstanding work is left alone.
    pub fn flush_queued(&mut self) -> usize {
        let removed = self.queued.len();
        self.queued.clear();
        if removed > 0 {
            info!(removed, "Flushed queued jobs");
        }
        removed
    }

    /// Move every planned job to the queue.
    pub fn promote_planned(&mut self) -> Result<usize, LedgerError> {
        if self.planned.is_empty() {
            return Err(LedgerError::NothingPlanned);
        }
        let moved = self.planned.len();
        for mut job in self.planned.drain(..) {
            job.advance(JobState::Queued);
            self.queued.push_back(job);
        }
        debug!(moved, "Promoted planned jobs to queue");
        Ok(moved)
    }

    /// Claim up to `max` queued jobs, oldest first, marking them outstanding.
    ///
    /// Returns copies of the claimed jobs for submission to workers.
    pub fn claim(&mut self, max: usize) -> Vec<Job> {
        let take = max.min(self.queued.len());
        let mut claimed = Vec::with_capacity(take);
        for mut job in self.queued.drain(..take) {
            job.advance(JobState::Outstanding);
            claimed.push(job.clone());
            self.outstanding.insert(job.id, job);
        }
        if !claimed.is_empty() {
            debug!(count = claimed.len(), "Claimed queued jobs");
        }
        claimed
    }

    /// Record a worker's outcome for an outstanding job.
    pub fn mark_completed(&mut self, job_id: Uuid, outcome: JobOutcome) -> Result<(), LedgerError> {
        let mut job = self
            .outstanding
            .remove(&job_id)
            .ok_or(LedgerError::UnknownJob { id: job_id })?;
        job.advance(JobState::Completed);
        let result = JobResult::from_outcome(&job, outcome);
        debug!(job_id = %job_id, task_number = job.task_number, "Job completed");
        self.completed.insert(job_id, CompletedJob { job, result });
        Ok(())
    }

    /// Discard all completed jobs and their results.
    pub fn reset(&mut self) -> usize {
        let removed = self.completed.len();
        self.completed.clear();
        if removed > 0 {
            info!(removed, "Reset completed jobs");
        }
        removed
    }

    /// Remove specific completed jobs, e.g. the ones just written by a collection.
    pub fn remove_completed(&mut self, ids: &[Uuid]) -> usize {
        ids.iter()
            .filter(|id| self.completed.remove(id).is_some())
            .count()
    }

    /// Results of all completed jobs, ordered by task number.
    pub fn completed_results(&self) -> Vec<JobResult> {
        let mut results: Vec<JobResult> =
            self.completed.values().map(|c| c.result.clone()).collect();
        results.sort_by_key(|r| r.task_number);
        results
    }

    /// Snapshot of jobs in a given state, ordered by task number.
    pub fn jobs_in(&self, state: JobState) -> Vec<Job> {
        let mut jobs: Vec<Job> = match state {
            JobState::Planned => self.planned.iter().cloned().collect(),
            JobState::Queued => self.queued.iter().cloned().collect(),
            JobState::Outstanding => self.outstanding.values().cloned().collect(),
            JobState::Completed => self.completed.values().map(|c| c.job.clone()).collect(),
        };
        jobs.sort_by_key(|j| j.task_number);
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        JobCounts {
            planned: self.planned.len(),
            queued: self.queued.len(),
            outstanding: self.outstanding.len(),
            completed: self.completed.len(),
        }
    }

    pub fn task_counter(&self) -> u64 {
        self.task_counter
    }
}
