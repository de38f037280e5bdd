//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::error::{PlanError, VcsError, WorkerError};
use crate::ledger::JobSpec;
use crate::plans::{FileListing, PlanCatalog, PlanInput, PlanSignature, PlanStub};
use crate::vcs::{CommitInfo, GitStatus, VersionControl};
use crate::workers::{WorkItem, WorkerPool};

#[derive(Debug, Default)]
struct RepoState {
    files: Vec<String>,
    stash: Vec<Vec<String>>,
    commits: u32,
    unreachable: bool,
    unstash_fails: bool,
}

/// A repository that exists only in memory.
#[derive(Debug, Default)]
pub struct FakeVcs {
    state: Mutex<RepoState>,
}

impl FakeVcs {
    pub fn clean() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dirty(files: &[&str]) -> Arc<Self> {
        let vcs = Self::default();
        vcs.state().files = files.iter().map(|f| f.to_string()).collect();
        Arc::new(vcs)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap()
    }

    /// Commit everything that is uncommitted.
    pub fn commit(&self) {
        let mut state = self.state();
        state.files.clear();
        state.commits += 1;
    }

    pub fn touch(&self, file: &str) {
        self.state().files.push(file.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_unstash_fails(&self, fails: bool) {
        self.state().unstash_fails = fails;
    }

    pub fn stash_depth(&self) -> usize {
        self.state().stash.len()
    }

    pub fn head(&self) -> String {
        format!("c{:07}", self.state().commits)
    }

    fn check_reachable(state: &RepoState) -> Result<(), VcsError> {
        if state.unreachable {
            return Err(VcsError::Unreachable {
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn status(&self) -> Result<GitStatus, VcsError> {
        let head = self.head();
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(GitStatus {
            is_clean: state.files.is_empty(),
            uncommitted_files: state.files.clone(),
            current_commit: CommitInfo {
                hash: head,
                message: "test commit".into(),
            },
            is_detached: false,
        })
    }

    async fn stash(&self) -> Result<bool, VcsError> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        if state.files.is_empty() {
            return Ok(false);
        }
        let files = std::mem::take(&mut state.files);
        state.stash.push(files);
        Ok(true)
    }

    async fn unstash(&self) -> Result<bool, VcsError> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        if state.unstash_fails {
            return Err(VcsError::CommandFailed {
                command: "stash pop".into(),
                reason: "CONFLICT (content): Merge conflict in config.toml".into(),
            });
        }
        match state.stash.pop() {
            Some(files) => {
                state.files.extend(files);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Catalog with a single plan `p1` whose instantiation yields `lines` jobs.
pub struct StaticCatalog {
    lines: usize,
}

impl StaticCatalog {
    pub fn with_lines(lines: usize) -> Arc<Self> {
        Arc::new(Self { lines })
    }

    fn plan() -> PlanSignature {
        PlanSignature {
            id: "p1".into(),
            name: "Plan One".into(),
            description: String::new(),
            handler: "to_caps".into(),
            output_file: "results".into(),
            output_dir: "analysis/default".into(),
            inputs: vec![PlanInput {
                name: "corpus".into(),
                kind: "jsonl".into(),
                required: true,
            }],
        }
    }
}

#[async_trait]
impl PlanCatalog for StaticCatalog {
    async fn list_plans(&self) -> Result<Vec<PlanSignature>, PlanError> {
        Ok(vec![Self::plan()])
    }

    async fn list_files(&self) -> Result<FileListing, PlanError> {
        Ok(FileListing::default())
    }

    async fn instantiate(
        &self,
        plan: &PlanSignature,
        _inputs: &HashMap<String, String>,
    ) -> Result<Vec<JobSpec>, PlanError> {
        Ok((0..self.lines)
            .map(|i| JobSpec {
                handler: plan.handler.clone(),
                payload: json!({"task": plan.handler, "text": format!("line {i}")}),
            })
            .collect())
    }

    async fn create_stub(&self, name: &str) -> Result<PlanStub, PlanError> {
        Err(PlanError::InvalidName(name.to_string()))
    }
}

/// Pool that accepts work and holds it until the test decides how it ends.
pub struct FakePool {
    capacity: usize,
    running: Mutex<Vec<WorkItem>>,
    refuse: Mutex<bool>,
}

impl FakePool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            running: Mutex::new(Vec::new()),
            refuse: Mutex::new(false),
        })
    }

    /// Take every submitted item, freeing its worker.
    pub fn take_running(&self) -> Vec<WorkItem> {
        std::mem::take(&mut *self.running.lock().unwrap())
    }

    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }
}

#[async_trait]
impl WorkerPool for FakePool {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn available(&self) -> usize {
        self.capacity - self.running.lock().unwrap().len()
    }

    async fn submit(&self, item: WorkItem) -> Result<(), WorkerError> {
        if *self.refuse.lock().unwrap() {
            return Err(WorkerError::Failed {
                handler: item.job.handler,
                reason: "pool offline".into(),
            });
        }
        let mut running = self.running.lock().unwrap();
        if running.len() >= self.capacity {
            return Err(WorkerError::NoIdleWorker);
        }
        running.push(item);
        Ok(())
    }
}

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Repository with a committed `tracked.txt` and an older stash of the user's own.
pub fn repo_with_user_stash() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    git(path, &["init", "-q"]);
    git(path, &["config", "user.email", "dev@example.com"]);
    git(path, &["config", "user.name", "dev"]);
    std::fs::write(path.join("tracked.txt"), "committed\n").unwrap();
    git(path, &["add", "tracked.txt"]);
    git(path, &["commit", "-q", "-m", "initial"]);
    std::fs::write(path.join("tracked.txt"), "user wip\n").unwrap();
    git(path, &["stash", "push", "-q", "-m", "user wip"]);
    dir
}
