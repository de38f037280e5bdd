//! Local `git` CLI backend.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{CommitInfo, GitStatus, VersionControl};
use crate::error::VcsError;

/// Message attached to stashes made for a collection.
const STASH_MESSAGE: &str = "Auto-stash for collection";

/// Runs `git` in a repository directory.
pub struct GitCli {
    repo_path: PathBuf,
    timeout: Duration,
    /// Commit of the stash this backend pushed and has not popped yet.
    own_stash: Mutex<Option<String>>,
}

impl GitCli {
    pub fn new(repo_path: PathBuf, timeout: Duration) -> Self {
        Self {
            repo_path,
            timeout,
            own_stash: Mutex::new(None),
        }
    }

    fn own_stash(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.own_stash.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a git command and return trimmed stdout.
    async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        Ok(self.run_raw(args).await?.trim().to_string())
    }

    /// Run a git command and return stdout untouched.
    async fn run_raw(&self, args: &[&str]) -> Result<String, VcsError> {
        let command = args.join(" ");
        debug!(command = %command, "Running git");

        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| VcsError::Timeout {
                command: command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| VcsError::Unreachable {
                reason: format!("failed to spawn git: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %command, stderr = %stderr, "git command failed");
            return Err(VcsError::CommandFailed {
                command,
                reason: stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn porcelain(&self) -> Result<Vec<String>, VcsError> {
        let output = self
            .run_raw(&["status", "--porcelain", "--ignore-submodules"])
            .await?;
        Ok(parse_porcelain(&output))
    }

    /// Commit of the newest stash entry, if any.
    async fn stash_head(&self) -> Result<Option<String>, VcsError> {
        let head = self.run(&["stash", "list", "-n", "1", "--format=%H"]).await?;
        Ok((!head.is_empty()).then_some(head))
    }

    /// Reflog selector (`stash@{n}`) of the stash entry at `commit`.
    async fn stash_selector(&self, commit: &str) -> Result<Option<String>, VcsError> {
        let listing = self.run(&["stash", "list", "--format=%gd %H"]).await?;
        Ok(listing.lines().find_map(|line| {
            let (selector, hash) = line.split_once(' ')?;
            (hash == commit).then(|| selector.to_string())
        }))
    }
}

/// Paths named by `git status --porcelain`. Renames report the new path.
fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            path.rsplit_once(" -> ").map_or(path, |(_, to)| to).to_string()
        })
        .collect()
}

#[async_trait]
impl VersionControl for GitCli {
    async fn status(&self) -> Result<GitStatus, VcsError> {
        let uncommitted_files = self.porcelain().await?;
        let hash = self.run(&["rev-parse", "HEAD"]).await?;
        let message = self.run(&["log", "-1", "--pretty=%B"]).await?;

        // A failure here should not mask the cleanliness answer.
        let is_detached = match self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Ok(branch) => branch == "HEAD",
            Err(_) => false,
        };

        Ok(GitStatus {
            is_clean: uncommitted_files.is_empty(),
            uncommitted_files,
            current_commit: CommitInfo { hash, message },
            is_detached,
        })
    }

    async fn stash(&self) -> Result<bool, VcsError> {
        // `stash push` exits 0 without stashing when only untracked files
        // differ, so a new stash is detected by the newest entry changing.
        let before = self.stash_head().await?;
        self.run(&["stash", "push", "-m", STASH_MESSAGE]).await?;
        let after = self.stash_head().await?;

        match after {
            Some(commit) if before.as_deref() != Some(commit.as_str()) => {
                info!(repo = %self.repo_path.display(), "Stashed changes for collection");
                *self.own_stash() = Some(commit);
                Ok(true)
            }
            _ => {
                debug!("Nothing to stash");
                Ok(false)
            }
        }
    }

    async fn unstash(&self) -> Result<bool, VcsError> {
        let Some(commit) = self.own_stash().clone() else {
            return Ok(false);
        };
        let Some(selector) = self.stash_selector(&commit).await? else {
            warn!(commit = %commit, "Collection stash no longer in stash list");
            *self.own_stash() = None;
            return Ok(false);
        };

        self.run(&["stash", "pop", &selector]).await?;
        *self.own_stash() = None;
        info!(repo = %self.repo_path.display(), "Restored stashed changes");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{git, repo_with_user_stash};

    #[test]
    fn porcelain_yields_paths() {
        let files = parse_porcelain(" M src/lib.rs\n?? notes.txt\nR  old.rs -> new.rs\n\n");
        assert_eq!(files, vec!["src/lib.rs", "notes.txt", "new.rs"]);
        assert!(parse_porcelain("").is_empty());
    }

    #[tokio::test]
    async fn missing_repository_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let git_cli = GitCli::new(dir.path().join("absent"), Duration::from_secs(5));
        assert!(git_cli.status().await.is_err());
    }

    fn read(dir: &tempfile::TempDir, file: &str) -> String {
        std::fs::read_to_string(dir.path().join(file)).unwrap()
    }

    #[tokio::test]
    async fn untracked_only_leaves_user_stash_alone() {
        let dir = repo_with_user_stash();
        std::fs::write(dir.path().join("new.txt"), "scratch\n").unwrap();
        let git_cli = GitCli::new(dir.path().to_path_buf(), Duration::from_secs(10));

        assert!(!git_cli.stash().await.unwrap());
        let status = git_cli.status().await.unwrap();
        assert!(!status.is_clean);
        assert_eq!(status.uncommitted_files, vec!["new.txt"]);

        assert!(!git_cli.unstash().await.unwrap());
        assert_eq!(read(&dir, "tracked.txt"), "committed\n");
        assert_eq!(git(dir.path(), &["stash", "list"]).lines().count(), 1);
    }

    #[tokio::test]
    async fn unstash_pops_only_the_collection_stash() {
        let dir = repo_with_user_stash();
        std::fs::write(dir.path().join("tracked.txt"), "edited\n").unwrap();
        let git_cli = GitCli::new(dir.path().to_path_buf(), Duration::from_secs(10));

        assert!(git_cli.stash().await.unwrap());
        assert!(git_cli.status().await.unwrap().is_clean);
        assert_eq!(read(&dir, "tracked.txt"), "committed\n");

        assert!(git_cli.unstash().await.unwrap());
        assert_eq!(read(&dir, "tracked.txt"), "edited\n");
        let remaining = git(dir.path(), &["stash", "list"]);
        assert_eq!(remaining.lines().count(), 1);
        assert!(remaining.contains("user wip"));

        // Nothing of ours is left to pop.
        assert!(!git_cli.unstash().await.unwrap());
        assert_eq!(git(dir.path(), &["stash", "list"]).lines().count(), 1);
    }
}
