//! Consistency gate.
//!
//! Results are only attributable to a commit if the tree that produced them
//! was clean. Gating decisions always query the collaborator fresh; the
//! cached status is only for display polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{GitStatus, VersionControl};
use crate::error::VcsError;

pub struct ConsistencyGate {
    vcs: Arc<dyn VersionControl>,
    cache_ttl: Duration,
    cache: RwLock<Option<(Instant, GitStatus)>>,
}

impl ConsistencyGate {
    pub fn new(vcs: Arc<dyn VersionControl>, cache_ttl: Duration) -> Self {
        Self {
            vcs,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    /// Fresh status from the collaborator. Also refreshes the display cache.
    pub async fn check_clean(&self) -> Result<GitStatus, VcsError> {
        let status = self.vcs.status().await?;
        *self.cache.write().await = Some((Instant::now(), status.clone()));
        Ok(status)
    }

    /// Fail with `DirtyWorkspace` unless the tree is clean.
    ///
    /// Returns the status so callers can record the commit they gated on.
    pub async fn require_clean(&self, operation: &str) -> Result<GitStatus, VcsError> {
        let status = self.check_clean().await?;
        if !status.is_clean {
            warn!(
                operation,
                files = status.uncommitted_files.len(),
                "Rejected: repository has uncommitted changes"
            );
            return Err(VcsError::DirtyWorkspace {
                operation: operation.to_string(),
                uncommitted_files: status.uncommitted_files,
            });
        }
        Ok(status)
    }

    /// Status for polling clients; may be up to `cache_ttl` old.
    pub async fn cached_status(&self) -> Result<GitStatus, VcsError> {
        if let Some((at, status)) = self.cache.read().await.as_ref() {
            if at.elapsed() < self.cache_ttl {
                debug!("Serving cached git status");
                return Ok(status.clone());
            }
        }
        self.check_clean().await
    }

    pub async fn stash(&self) -> Result<bool, VcsError> {
        let stashed = self.vcs.stash().await?;
        self.invalidate().await;
        Ok(stashed)
    }

    pub async fn unstash(&self) -> Result<bool, VcsError> {
        let result = self.vcs.unstash().await;
        self.invalidate().await;
        result
    }

    async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
