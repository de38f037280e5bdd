use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::artifact::{self, ArtifactName};
use super::record::{CollectMode, CollectionRecord, RecordLog};
use crate::error::{CollectError, Result};
use crate::project::{PlanMetadata, ProjectRuntime, ProjectStore};
use crate::vcs::ConsistencyGate;

const DEFAULT_OUTPUT_FILE: &str = "results";
const DEFAULT_OUTPUT_DIR: &str = "analysis/default";

/// Drains completed jobs into artifacts, once per call.
pub struct CollectionCoordinator {
    projects: Arc<ProjectStore>,
    gate: Arc<ConsistencyGate>,
    data_dir: PathBuf,
}

/// How the write should be attributed.
struct Attribution {
    source_commit: Option<String>,
    dirty: bool,
}

impl CollectionCoordinator {
    pub fn new(projects: Arc<ProjectStore>, gate: Arc<ConsistencyGate>, data_dir: PathBuf) -> Self {
        Self {
            projects,
            gate,
            data_dir,
        }
    }

    /// Collection history of the active project.
    pub async fn records(&self) -> Result<Vec<CollectionRecord>> {
        let runtime = self.projects.active().await?;
        Ok(RecordLog::for_project(&runtime.project().root_path)
            .load()
            .await?)
    }

    pub async fn collect(&self, label: Option<&str>, mode: CollectMode) -> Result<CollectionRecord> {
        let runtime = self.projects.active().await?;
        let _collecting = runtime.begin_collection().await;

        if runtime.lock().await.ledger.counts().completed == 0 {
            return Err(CollectError::NothingToCollect.into());
        }

        match mode {
            CollectMode::Clean => {
                let status = self.gate.require_clean("collect").await?;
                let attribution = Attribution {
                    source_commit: Some(status.current_commit.hash),
                    dirty: false,
                };
                self.write(&runtime, label, mode, attribution).await
            }
            CollectMode::Force => {
                let attribution = Attribution {
                    source_commit: None,
                    dirty: true,
                };
                self.write(&runtime, label, mode, attribution).await
            }
            CollectMode::Stash => self.collect_stashed(&runtime, label).await,
        }
    }

    async fn collect_stashed(
        &self,
        runtime: &ProjectRuntime,
        label: Option<&str>,
    ) -> Result<CollectionRecord> {
        let stashed = self.gate.stash().await?;
        if !stashed {
            info!(project = runtime.name(), "Nothing to stash; collecting as clean");
        }

        let written = async {
            let status = self.gate.require_clean("collect").await?;
            let attribution = Attribution {
                source_commit: Some(status.current_commit.hash),
                dirty: false,
            };
            self.write(runtime, label, CollectMode::Stash, attribution)
                .await
        }
        .await;

        if !stashed {
            return written;
        }

        match (written, self.gate.unstash().await) {
            (Ok(record), Ok(_)) => {
                info!(project = runtime.name(), "Stashed changes restored");
                Ok(record)
            }
            (Ok(record), Err(e)) => {
                error!(
                    project = runtime.name(),
                    filename = %record.filename,
                    error = %e,
                    "Collected, but stashed changes could not be restored"
                );
                Err(CollectError::StashConflict {
                    record: Box::new(record),
                    reason: e.to_string(),
                }
                .into())
            }
            (Err(e), unstash) => {
                if let Err(unstash_err) = unstash {
                    error!(
                        project = runtime.name(),
                        error = %unstash_err,
                        "Collection failed and stashed changes could not be restored"
                    );
                }
                Err(e)
            }
        }
    }

    /// Write the completed set, drain exactly what was written, append the record.
    async fn write(
        &self,
        runtime: &ProjectRuntime,
        label: Option<&str>,
        mode: CollectMode,
        attribution: Attribution,
    ) -> Result<CollectionRecord> {
        let (results, plan) = {
            let state = runtime.lock().await;
            (state.ledger.completed_results(), state.current_plan.clone())
        };
        let Some(first) = results.first() else {
            return Err(CollectError::NothingToCollect.into());
        };
        let first_job = first.job_id;

        let log = RecordLog::for_project(&runtime.project().root_path);
        let label = match label.map(artifact::clean_label) {
            Some(label) if !label.is_empty() => label,
            _ => artifact::generated_label(log.load().await?.len()),
        };

        let (output_file, output_dir) = match &plan {
            Some(PlanMetadata {
                output_file,
                output_dir,
                ..
            }) => (output_file.as_str(), output_dir.as_str()),
            None => (DEFAULT_OUTPUT_FILE, DEFAULT_OUTPUT_DIR),
        };

        let finished_at = Utc::now();
        let name = ArtifactName {
            output_file,
            finished_at,
            first_job,
            label: &label,
            dirty: attribution.dirty,
        };
        let path = name.next_free(&self.data_dir.join(output_dir)).await?;
        artifact::write_results(&path, &results).await?;

        let written: Vec<Uuid> = results.iter().map(|r| r.job_id).collect();
        let removed = runtime.lock().await.ledger.remove_completed(&written);
        if removed != written.len() {
            warn!(
                project = runtime.name(),
                written = written.len(),
                removed,
                "Some collected jobs were already gone from the ledger"
            );
        }

        let record = CollectionRecord {
            label,
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
            source_commit: attribution.source_commit,
            dirty: attribution.dirty,
            count: written.len(),
            collected_at: finished_at,
            mode,
        };

        // The artifact exists and the ledger is drained; a lost record is not fatal.
        if let Err(e) = log.append(&record).await {
            warn!(project = runtime.name(), error = %e, "Failed to append collection record");
        }

        info!(
            project = runtime.name(),
            %mode,
            count = record.count,
            filename = %record.filename,
            dirty = record.dirty,
            "Collected results"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::{Error, VcsError};
    use crate::ledger::{JobOutcome, JobSpec};
    use crate::test_support::{FakeVcs, git, repo_with_user_stash};
    use crate::vcs::{GitCli, VersionControl};
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        projects: Arc<ProjectStore>,
        vcs: Arc<FakeVcs>,
        coordinator: CollectionCoordinator,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let projects = Arc::new(ProjectStore::open(dir.path()).await.unwrap());
        let vcs = FakeVcs::clean();
        let gate = Arc::new(ConsistencyGate::new(vcs.clone(), Duration::from_secs(1)));
        let coordinator =
            CollectionCoordinator::new(Arc::clone(&projects), gate, dir.path().to_path_buf());
        Harness {
            dir,
            projects,
            vcs,
            coordinator,
        }
    }

    /// Push `n` jobs straight through to completed.
    async fn complete(h: &Harness, n: usize) {
        let runtime = h.projects.active().await.unwrap();
        let mut state = runtime.lock().await;
        state.ledger.plan(
            (0..n)
                .map(|i| JobSpec {
                    handler: "to_caps".into(),
                    payload: json!({"text": format!("t{i}")}),
                })
                .collect(),
        );
        state.ledger.promote_planned().unwrap();
        for job in state.ledger.claim(n) {
            state
                .ledger
                .mark_completed(
                    job.id,
                    JobOutcome::Succeeded {
                        worker_id: "worker_1".into(),
                        data: json!({"result": job.task_number}),
                    },
                )
                .unwrap();
        }
    }

    async fn completed(h: &Harness) -> usize {
        h.projects.active().await.unwrap().snapshot().await.counts.completed
    }

    #[tokio::test]
    async fn empty_completed_set_fails() {
        let h = harness().await;
        assert!(matches!(
            h.coordinator.collect(Some("x"), CollectMode::Force).await,
            Err(Error::Collect(CollectError::NothingToCollect))
        ));
    }

    #[tokio::test]
    async fn clean_collect_writes_and_drains() {
        let h = harness().await;
        complete(&h, 3).await;

        let record = h
            .coordinator
            .collect(Some("run1"), CollectMode::Clean)
            .await
            .unwrap();
        assert_eq!(record.count, 3);
        assert!(!record.dirty);
        assert_eq!(record.source_commit.as_deref(), Some(h.vcs.head().as_str()));
        assert!(record.path.starts_with(h.dir.path().join("analysis/default")));
        assert!(record.filename.starts_with("results_"));
        assert!(record.filename.ends_with("_run1.jsonl"));
        assert_eq!(completed(&h).await, 0);

        let body = tokio::fs::read_to_string(&record.path).await.unwrap();
        let numbers: Vec<u64> = body
            .lines()
            .map(|l| {
                let line: serde_json::Value = serde_json::from_str(l).unwrap();
                line["task_number"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        assert!(matches!(
            h.coordinator.collect(None, CollectMode::Clean).await,
            Err(Error::Collect(CollectError::NothingToCollect))
        ));
    }

    #[tokio::test]
    async fn clean_collect_refuses_dirty_tree() {
        let h = harness().await;
        complete(&h, 1).await;
        h.vcs.touch("model.py");

        assert!(matches!(
            h.coordinator.collect(None, CollectMode::Clean).await,
            Err(Error::Vcs(VcsError::DirtyWorkspace { .. }))
        ));
        assert_eq!(completed(&h).await, 1);
    }

    #[tokio::test]
    async fn force_collect_on_dirty_tree_marks_dirty() {
        let h = harness().await;
        complete(&h, 2).await;
        h.vcs.touch("model.py");

        let record = h
            .coordinator
            .collect(Some("run1"), CollectMode::Force)
            .await
            .unwrap();
        assert!(record.dirty);
        assert!(record.source_commit.is_none());
        assert!(record.filename.ends_with("_run1_DIRTY.jsonl"));
        assert_eq!(completed(&h).await, 0);
    }

    #[tokio::test]
    async fn stash_collect_restores_changes() {
        let h = harness().await;
        complete(&h, 2).await;
        h.vcs.touch("model.py");

        let record = h
            .coordinator
            .collect(None, CollectMode::Stash)
            .await
            .unwrap();
        assert!(!record.dirty);
        assert_eq!(record.mode, CollectMode::Stash);
        assert_eq!(h.vcs.stash_depth(), 0);
        assert!(!h.vcs.status().await.unwrap().is_clean);
    }

    #[tokio::test]
    async fn stash_with_nothing_to_stash_behaves_as_clean() {
        let h = harness().await;
        complete(&h, 1).await;

        let record = h.coordinator.collect(None, CollectMode::Stash).await.unwrap();
        assert!(!record.dirty);
        assert_eq!(h.vcs.stash_depth(), 0);
    }

    #[tokio::test]
    async fn failed_unstash_is_a_stash_conflict() {
        let h = harness().await;
        complete(&h, 2).await;
        h.vcs.touch("model.py");
        h.vcs.set_unstash_fails(true);

        match h.coordinator.collect(Some("s"), CollectMode::Stash).await {
            Err(Error::Collect(CollectError::StashConflict { record, .. })) => {
                assert_eq!(record.count, 2);
                assert!(record.path.exists());
            }
            other => panic!("expected StashConflict, got {other:?}"),
        }
        assert_eq!(completed(&h).await, 0);
        assert_eq!(h.vcs.stash_depth(), 1);
        assert_eq!(h.coordinator.records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generated_labels_count_previous_collections() {
        let h = harness().await;
        complete(&h, 1).await;
        let first = h.coordinator.collect(None, CollectMode::Force).await.unwrap();
        complete(&h, 1).await;
        let second = h.coordinator.collect(Some("  "), CollectMode::Force).await.unwrap();

        assert_eq!(first.label, "run001");
        assert_eq!(second.label, "run002");
        let labels: Vec<String> = h
            .coordinator
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, vec!["run001", "run002"]);
    }

    #[tokio::test]
    async fn plan_metadata_picks_output_location() {
        let h = harness().await;
        complete(&h, 1).await;
        h.projects.active().await.unwrap().lock().await.current_plan = Some(PlanMetadata {
            plan_id: "to_caps".into(),
            output_file: "caps".into(),
            output_dir: "analysis/caps".into(),
            source_commit: None,
        });

        let record = h.coordinator.collect(Some("a"), CollectMode::Clean).await.unwrap();
        assert!(record.path.starts_with(h.dir.path().join("analysis/caps")));
        assert!(record.filename.starts_with("caps_"));
    }

    #[tokio::test]
    async fn stash_collect_on_untracked_files_keeps_user_stash() {
        let repo = repo_with_user_stash();
        std::fs::write(repo.path().join("new.txt"), "scratch\n").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let projects = Arc::new(ProjectStore::open(dir.path()).await.unwrap());
        let vcs = Arc::new(GitCli::new(repo.path().to_path_buf(), Duration::from_secs(10)));
        let gate = Arc::new(ConsistencyGate::new(vcs, Duration::from_secs(1)));
        let coordinator =
            CollectionCoordinator::new(Arc::clone(&projects), gate, dir.path().to_path_buf());
        {
            let runtime = projects.active().await.unwrap();
            let mut state = runtime.lock().await;
            state.ledger.plan(vec![JobSpec {
                handler: "to_caps".into(),
                payload: json!({"text": "a"}),
            }]);
            state.ledger.promote_planned().unwrap();
            let job = state.ledger.claim(1).remove(0);
            state
                .ledger
                .mark_completed(
                    job.id,
                    JobOutcome::Succeeded {
                        worker_id: "worker_1".into(),
                        data: json!({"result": "A"}),
                    },
                )
                .unwrap();
        }

        let err = coordinator.collect(None, CollectMode::Stash).await.unwrap_err();
        assert!(matches!(err, Error::Vcs(VcsError::DirtyWorkspace { .. })));

        let tracked = std::fs::read_to_string(repo.path().join("tracked.txt")).unwrap();
        assert_eq!(tracked, "committed\n");
        let stashes = git(repo.path(), &["stash", "list"]);
        assert_eq!(stashes.lines().count(), 1);
        assert!(stashes.contains("user wip"));
        let runtime = projects.active().await.unwrap();
        assert_eq!(runtime.lock().await.ledger.counts().completed, 1);
    }
}
