//! Collection records and the per-project record log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::CollectError;

const RECORD_LOG: &str = "collections.jsonl";

/// How the workspace was treated during a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Requires a clean workspace.
    Clean,
    /// Stashes uncommitted changes around the write.
    Stash,
    /// Skips the gate; output is marked dirty.
    Force,
}

impl std::fmt::Display for CollectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Stash => write!(f, "stash"),
            Self::Force => write!(f, "force"),
        }
    }
}

/// One successful collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub label: String,
    pub filename: String,
    pub path: PathBuf,
    /// Commit the results are attributable to. `None` for forced collections.
    pub source_commit: Option<String>,
    pub dirty: bool,
    pub count: usize,
    pub collected_at: DateTime<Utc>,
    pub mode: CollectMode,
}

/// Append-only JSONL log of a project's collections.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn for_project(root: &Path) -> Self {
        Self {
            path: root.join(RECORD_LOG),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first. Unparseable lines are skipped.
    pub async fn load(&self) -> Result<Vec<CollectionRecord>, CollectError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "Skipping malformed collection record"
                ),
            }
        }
        Ok(records)
    }

    pub async fn append(&self, record: &CollectionRecord) -> Result<(), CollectError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
