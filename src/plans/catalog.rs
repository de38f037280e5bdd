//! Filesystem plan catalog.
//!
//! Plans are `<id>.json` descriptors in the plans directory. Inputs are
//! JSONL files; each line becomes one job carrying the line's `text`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::fs;
use tracing::{info, warn};

use super::{
    FileEntry, FileListing, PlanCatalog, PlanInput, PlanSignature, PlanStub, sanitize_name,
};
use crate::error::PlanError;
use crate::ledger::JobSpec;

pub struct FsPlanCatalog {
    plans_dir: PathBuf,
    data_dir: PathBuf,
}

impl FsPlanCatalog {
    pub fn new(plans_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            plans_dir,
            data_dir,
        }
    }

    /// Relative input paths are taken relative to the data directory.
    fn resolve_input(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.data_dir.join(p)
        }
    }

    async fn load_descriptor(path: &Path, id: &str) -> Result<PlanSignature, PlanError> {
        let raw = fs::read_to_string(path).await?;
        let mut sig: PlanSignature = serde_json::from_str(&raw)?;
        sig.id = id.to_string();
        if sig.handler.is_empty() {
            sig.handler = id.to_string();
        }
        Ok(sig)
    }

    /// Entries of `dir` matching `keep`, sorted by name. A missing directory is empty.
    async fn list_dir<F>(dir: &Path, prefix: &str, keep: F) -> Result<Vec<FileEntry>, PlanError>
    where
        F: Fn(&str, bool) -> bool,
    {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await?.is_dir();
            if keep(&name, is_dir) {
                found.push(FileEntry {
                    path: format!("{prefix}/{name}"),
                    name,
                });
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

/// Text carried by one corpus line: the `text` field if present, else the line itself.
fn line_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Object(ref map) => match map.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn title_case(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl PlanCatalog for FsPlanCatalog {
    async fn list_plans(&self) -> Result<Vec<PlanSignature>, PlanError> {
        let mut entries = match fs::read_dir(&self.plans_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut plans = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
                .map(str::to_string)
            else {
                continue;
            };
            if id.starts_with('_') {
                continue;
            }
            match Self::load_descriptor(&path, &id).await {
                Ok(sig) => plans.push(sig),
                Err(e) => warn!(plan = %id, error = %e, "Skipping unreadable plan descriptor"),
            }
        }
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    async fn list_files(&self) -> Result<FileListing, PlanError> {
        let corpus = Self::list_dir(&self.data_dir.join("corpora"), "corpora", |name, is_dir| {
            !is_dir && name.ends_with(".jsonl")
        })
        .await?;
        let analysis_dirs =
            Self::list_dir(&self.data_dir.join("analysis"), "analysis", |_, is_dir| is_dir)
                .await?;
        Ok(FileListing {
            corpus,
            analysis_dirs,
        })
    }

    async fn instantiate(
        &self,
        plan: &PlanSignature,
        inputs: &HashMap<String, String>,
    ) -> Result<Vec<JobSpec>, PlanError> {
        // The first declared input that was supplied drives the expansion.
        let Some((input, path)) = plan
            .inputs
            .iter()
            .find_map(|i| inputs.get(&i.name).map(|p| (i, p)))
        else {
            return Ok(Vec::new());
        };

        let resolved = self.resolve_input(path);
        let raw = fs::read_to_string(&resolved)
            .await
            .map_err(|e| PlanError::InputUnreadable {
                input: input.name.clone(),
                path: resolved.clone(),
                reason: e.to_string(),
            })?;

        let mut specs = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value =
                serde_json::from_str(line).map_err(|e| PlanError::InvalidCorpus {
                    path: resolved.clone(),
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            specs.push(JobSpec {
                handler: plan.handler.clone(),
                payload: json!({"task": plan.handler, "text": line_text(value)}),
            });
        }

        info!(plan = %plan.id, input = %resolved.display(), jobs = specs.len(), "Instantiated plan");
        Ok(specs)
    }

    async fn create_stub(&self, name: &str) -> Result<PlanStub, PlanError> {
        let id = sanitize_name(name);
        if id.is_empty() {
            return Err(PlanError::InvalidName(name.to_string()));
        }

        let path = self.plans_dir.join(format!("{id}.json"));
        if fs::try_exists(&path).await? {
            return Err(PlanError::AlreadyExists(format!("{id}.json")));
        }

        let stub = PlanSignature {
            id: id.clone(),
            name: title_case(&id),
            description: "New plan created via UI.".to_string(),
            handler: id.clone(),
            output_file: id.clone(),
            output_dir: format!("analysis/{id}"),
            inputs: vec![PlanInput {
                name: "corpus".to_string(),
                kind: "jsonl".to_string(),
                required: true,
            }],
        };

        fs::create_dir_all(&self.plans_dir).await?;
        fs::write(&path, serde_json::to_string_pretty(&stub)?).await?;
        info!(plan = %id, path = %path.display(), "Created plan stub");

        Ok(PlanStub { id, path })
    }
}
