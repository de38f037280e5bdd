//! Project store: the set of projects and which one is active.
//!
//! Switching is a two-step state change. While it is under way the store is
//! in `Slot::Switching`, and every caller asking for the active project gets
//! `SwitchInProgress` rather than a half-switched answer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::model::{DEFAULT_PROJECT, Project, RegistryFile, validate_name};
use super::state::ProjectRuntime;
use crate::error::ProjectError;

const REGISTRY_FILE: &str = "projects.json";

#[derive(Debug)]
enum Slot {
    Active(Arc<ProjectRuntime>),
    Switching { from: Arc<ProjectRuntime>, to: String },
}

struct Inner {
    projects: Vec<Project>,
    /// Runtimes survive switches so each project resumes where it was left.
    runtimes: HashMap<String, Arc<ProjectRuntime>>,
    slot: Slot,
}

impl Inner {
    fn runtime_for(&mut self, project: &Project) -> Arc<ProjectRuntime> {
        Arc::clone(
            self.runtimes
                .entry(project.name.clone())
                .or_insert_with(|| Arc::new(ProjectRuntime::new(project.clone()))),
        )
    }

    fn registry_file(&self) -> RegistryFile {
        let current_project = match &self.slot {
            Slot::Active(runtime) => runtime.name().to_string(),
            Slot::Switching { to, .. } => to.clone(),
        };
        RegistryFile {
            current_project,
            projects: self.projects.clone(),
        }
    }
}

/// Projects as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListing {
    /// `None` while a switch is in progress.
    pub current_project: Option<String>,
    pub switch_in_progress: bool,
    /// Project being left while a switch is under way.
    pub switching_from: Option<String>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Switched { from: String, to: String },
    AlreadyActive { project: String },
}

/// A started switch that must be finished with `finish_switch`.
#[derive(Debug)]
pub struct SwitchTicket {
    from: Arc<ProjectRuntime>,
    to: Project,
}

#[derive(Debug)]
pub enum SwitchStart {
    Started(SwitchTicket),
    AlreadyActive(String),
}

pub struct ProjectStore {
    registry_path: PathBuf,
    projects_root: PathBuf,
    inner: RwLock<Inner>,
    /// Orders registry writes so the file always reflects the latest state.
    persist_lock: Mutex<()>,
}

impl ProjectStore {
    /// Load the registry from `data_dir`, creating the default project on first use.
    pub async fn open(data_dir: &Path) -> Result<Self, ProjectError> {
        let registry_path = data_dir.join(REGISTRY_FILE);
        let projects_root = data_dir.join("projects");

        let mut file = match fs::read_to_string(&registry_path).await {
            Ok(raw) => serde_json::from_str::<RegistryFile>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };

        if file.projects.is_empty() {
            file.projects.push(Project::new(
                DEFAULT_PROJECT,
                "Default project",
                projects_root.join(DEFAULT_PROJECT),
            ));
        }

        // A crash mid-switch can leave a name that no longer resolves.
        let current = match file
            .projects
            .iter()
            .find(|p| p.name == file.current_project)
        {
            Some(p) => p.clone(),
            None => {
                let fallback = file.projects[0].clone();
                if !file.current_project.is_empty() {
                    warn!(
                        recorded = %file.current_project,
                        using = %fallback.name,
                        "Recorded current project not found; falling back"
                    );
                }
                fallback
            }
        };

        fs::create_dir_all(&current.root_path).await?;
        let runtime = Arc::new(ProjectRuntime::new(current.clone()));
        let runtimes = HashMap::from([(current.name.clone(), Arc::clone(&runtime))]);

        let store = Self {
            registry_path,
            projects_root,
            inner: RwLock::new(Inner {
                projects: file.projects,
                runtimes,
                slot: Slot::Active(runtime),
            }),
            persist_lock: Mutex::new(()),
        };
        store.persist().await?;

        info!(project = %current.name, "Project store opened");
        Ok(store)
    }

    /// Write the registry atomically (temp file + rename).
    async fn persist(&self) -> Result<(), ProjectError> {
        let _guard = self.persist_lock.lock().await;
        let file = self.inner.read().await.registry_file();
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.registry_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.registry_path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.registry_path).await?;
        Ok(())
    }

    /// The active project's runtime.
    pub async fn active(&self) -> Result<Arc<ProjectRuntime>, ProjectError> {
        match &self.inner.read().await.slot {
            Slot::Active(runtime) => Ok(Arc::clone(runtime)),
            Slot::Switching { .. } => Err(ProjectError::SwitchInProgress),
        }
    }

    /// Runtime of any project that has been active in this process.
    ///
    /// Used to attribute late worker completions to the project that
    /// dispatched them, even after a switch.
    pub async fn runtime(&self, name: &str) -> Option<Arc<ProjectRuntime>> {
        self.inner.read().await.runtimes.get(name).cloned()
    }

    pub async fn is_switching(&self) -> bool {
        matches!(self.inner.read().await.slot, Slot::Switching { .. })
    }

    pub async fn list(&self) -> ProjectListing {
        let inner = self.inner.read().await;
        let (current_project, switching_from) = match &inner.slot {
            Slot::Active(runtime) => (Some(runtime.name().to_string()), None),
            Slot::Switching { from, .. } => (None, Some(from.name().to_string())),
        };
        ProjectListing {
            current_project,
            switch_in_progress: switching_from.is_some(),
            switching_from,
            projects: inner.projects.clone(),
        }
    }

    pub async fn create(&self, name: &str, description: &str) -> Result<Project, ProjectError> {
        validate_name(name)?;

        let project = {
            let mut inner = self.inner.write().await;
            if inner.projects.iter().any(|p| p.name == name) {
                return Err(ProjectError::DuplicateProject(name.to_string()));
            }
            let project = Project::new(name, description, self.projects_root.join(name));
            inner.projects.push(project.clone());
            project
        };

        let created = async {
            fs::create_dir_all(&project.root_path).await?;
            self.persist().await
        }
        .await;
        if let Err(e) = created {
            self.inner.write().await.projects.retain(|p| p.name != name);
            return Err(e);
        }

        info!(project = %name, "Created project");
        Ok(project)
    }

    /// Switch the active project.
    pub async fn switch(&self, name: &str) -> Result<SwitchOutcome, ProjectError> {
        match self.begin_switch(name).await? {
            SwitchStart::AlreadyActive(project) => Ok(SwitchOutcome::AlreadyActive { project }),
            SwitchStart::Started(ticket) => self.finish_switch(ticket).await,
        }
    }

    /// Enter the `Switching` state. Fails if another switch is under way.
    pub async fn begin_switch(&self, name: &str) -> Result<SwitchStart, ProjectError> {
        let mut inner = self.inner.write().await;
        let from = match &inner.slot {
            Slot::Switching { .. } => return Err(ProjectError::SwitchInProgress),
            Slot::Active(runtime) => Arc::clone(runtime),
        };
        let to = inner
            .projects
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ProjectError::UnknownProject(name.to_string()))?;

        if from.name() == name {
            return Ok(SwitchStart::AlreadyActive(name.to_string()));
        }

        info!(from = %from.name(), to = %name, "Switching project");
        inner.slot = Slot::Switching {
            from: Arc::clone(&from),
            to: to.name.clone(),
        };
        Ok(SwitchStart::Started(SwitchTicket { from, to }))
    }

    /// Complete a switch started with `begin_switch`. On failure the previous
    /// project is restored.
    pub async fn finish_switch(&self, ticket: SwitchTicket) -> Result<SwitchOutcome, ProjectError> {
        let SwitchTicket { from, to } = ticket;

        let prepared = async {
            fs::create_dir_all(&to.root_path).await?;
            self.persist().await
        }
        .await;

        if let Err(e) = prepared {
            warn!(to = %to.name, error = %e, "Project switch failed; restoring previous project");
            self.inner.write().await.slot = Slot::Active(Arc::clone(&from));
            if let Err(persist_err) = self.persist().await {
                warn!(error = %persist_err, "Failed to restore project registry");
            }
            return Err(e);
        }

        {
            let mut inner = self.inner.write().await;
            let runtime = inner.runtime_for(&to);
            inner.slot = Slot::Active(runtime);
        }

        info!(from = %from.name(), to = %to.name, "Switched project");
        Ok(SwitchOutcome::Switched {
            from: from.name().to_string(),
            to: to.name,
        })
    }
}
