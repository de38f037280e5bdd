//! Plan templates and the plan-catalog collaborator.
//!
//! - `catalog`: `FsPlanCatalog`, JSON plan descriptors and JSONL corpora on disk
//! - `registry`: `PlanRegistry`, validation and instantiation on top of a catalog

pub mod catalog;
pub mod registry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::ledger::JobSpec;

pub use catalog::FsPlanCatalog;
pub use registry::PlanRegistry;

/// One named input a plan expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInput {
    pub name: String,
    /// Free-form kind, e.g. `jsonl`.
    #[serde(default, alias = "type")]
    pub kind: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

fn default_output_file() -> String {
    "results".to_string()
}

fn default_output_dir() -> String {
    "analysis/default".to_string()
}

/// Plan descriptor as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSignature {
    /// Derived from the descriptor's file name.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Handler for every job the plan creates. Defaults to the plan id.
    #[serde(default)]
    pub handler: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub inputs: Vec<PlanInput>,
}

impl PlanSignature {
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|i| i.name.as_str()).collect()
    }
}

/// A file or directory clients may pass as a plan input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub corpus: Vec<FileEntry>,
    pub analysis_dirs: Vec<FileEntry>,
}

/// A freshly written plan descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStub {
    pub id: String,
    pub path: PathBuf,
}

/// Filesystem enumeration of plans and inputs.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<PlanSignature>, PlanError>;

    async fn list_files(&self) -> Result<FileListing, PlanError>;

    /// Expand a plan against resolved inputs into ordered job specs.
    async fn instantiate(
        &self,
        plan: &PlanSignature,
        inputs: &HashMap<String, String>,
    ) -> Result<Vec<JobSpec>, PlanError>;

    async fn create_stub(&self, name: &str) -> Result<PlanStub, PlanError>;
}

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"));

/// Lower-case a display name into an identifier: `"My Plan!"` → `"my_plan"`.
///
/// Returns an empty string if nothing usable remains.
pub fn sanitize_name(name: &str) -> String {
    NON_ALNUM
        .replace_all(name, "_")
        .trim_matches('_')
        .to_lowercase()
}
