//! Project model and the on-disk registry format.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProjectError;

/// Name of the project created on first start.
pub const DEFAULT_PROJECT: &str = "default";

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// A named, isolated workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub root_path: PathBuf,
    pub created: DateTime<Utc>,
}

impl Project {
    pub fn new(name: &str, description: &str, root_path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            root_path,
            created: Utc::now(),
        }
    }
}

/// Contents of `projects.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RegistryFile {
    #[serde(default)]
    pub current_project: String,
    #[serde(default)]
    pub projects: Vec<Project>,
}

pub fn validate_name(name: &str) -> Result<(), ProjectError> {
    if PROJECT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ProjectError::InvalidName(name.to_string()))
    }
}
