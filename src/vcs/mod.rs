//! Versioning collaborator.
//!
//! The orchestrator never inspects diffs; it only asks whether the working
//! tree is clean, which commit it sits on, and to stash/unstash around a
//! collection.
//!
//! - `git`: local `git` CLI backend
//! - `http`: client for a remote git service
//! - `gate`: `ConsistencyGate`, the clean-workspace policy

pub mod gate;
pub mod git;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VcsError;

pub use gate::ConsistencyGate;
pub use git::GitCli;
pub use http::HttpGitService;

/// Commit the working tree is based on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    #[serde(default)]
    pub message: String,
}

/// Snapshot of repository cleanliness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub is_clean: bool,
    /// Paths with uncommitted or untracked changes.
    #[serde(default)]
    pub uncommitted_files: Vec<String>,
    pub current_commit: CommitInfo,
    #[serde(default)]
    pub is_detached: bool,
}

/// Narrow interface onto the version-control subsystem.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Current cleanliness and commit.
    async fn status(&self) -> Result<GitStatus, VcsError>;

    /// Stash uncommitted changes. Returns `false` if there was nothing to stash.
    async fn stash(&self) -> Result<bool, VcsError>;

    /// Restore the stash made by `stash`. Returns `false` if there is none to
    /// restore; stashes made by anyone else are left in place.
    async fn unstash(&self) -> Result<bool, VcsError>;
}
