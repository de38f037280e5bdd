//! Artifact naming and writing.
//!
//! Artifacts are named
//! `<output_file>_<HH-MM>_<seq:03>_<job prefix>_<label>[_DIRTY].jsonl`,
//! where `seq` is the first number whose path is free.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::CollectError;
use crate::ledger::JobResult;

static LABEL_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static regex"));

/// Make a user label safe to embed in a file name.
pub fn clean_label(label: &str) -> String {
    LABEL_UNSAFE
        .replace_all(label.trim(), "_")
        .trim_matches('_')
        .to_string()
}

/// Label used when the caller gives none: `run001`, `run002`, ...
pub fn generated_label(previous_collections: usize) -> String {
    format!("run{:03}", previous_collections + 1)
}

/// Pieces of an artifact file name, minus the sequence number.
#[derive(Debug, Clone)]
pub struct ArtifactName<'a> {
    pub output_file: &'a str,
    pub finished_at: DateTime<Utc>,
    pub first_job: Uuid,
    pub label: &'a str,
    pub dirty: bool,
}

impl ArtifactName<'_> {
    fn file_name(&self, seq: u32) -> String {
        let job_prefix = self.first_job.simple().to_string();
        format!(
            "{}_{}_{:03}_{}_{}{}.jsonl",
            self.output_file,
            self.finished_at.format("%H-%M"),
            seq,
            &job_prefix[..8],
            self.label,
            if self.dirty { "_DIRTY" } else { "" },
        )
    }

    /// First free path in `dir`.
    pub async fn next_free(&self, dir: &Path) -> Result<PathBuf, CollectError> {
        let mut seq = 1;
        loop {
            let candidate = dir.join(self.file_name(seq));
            if !fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            seq += 1;
        }
    }
}

/// Write results as JSON lines. Never overwrites an existing file.
pub async fn write_results(path: &Path, results: &[JobResult]) -> Result<(), CollectError> {
    let mut body = String::new();
    for result in results {
        body.push_str(&serde_json::to_string(result)?);
        body.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
