//! Error types for the work orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::collect::CollectionRecord;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Project(#[from] ProjectError),

    #[error("{0}")]
    Vcs(#[from] VcsError),

    #[error("{0}")]
    Collect(#[from] CollectError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

/// Coarse classification of a failure, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad identifiers or inputs. Nothing changed.
    Validation,
    /// The request was well-formed but current conditions forbid it.
    Precondition,
    /// The versioning service or worker pool could not be reached.
    Collaborator,
    /// The operation partly applied and needs manual follow-up.
    PartialFailure,
    /// Local I/O or serialization failure.
    Internal,
}

impl Error {
    /// Classify this error for the command surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Internal,
            Self::Ledger(e) => match e {
                LedgerError::UnknownJob { .. } => ErrorKind::Validation,
                LedgerError::NothingPlanned => ErrorKind::Precondition,
            },
            Self::Plan(e) => match e {
                PlanError::InvalidPlan { .. }
                | PlanError::MissingInput { .. }
                | PlanError::InvalidName(_)
                | PlanError::AlreadyExists(_)
                | PlanError::InputUnreadable { .. }
                | PlanError::InvalidCorpus { .. } => ErrorKind::Validation,
                PlanError::Io(_) | PlanError::Serialization(_) => ErrorKind::Internal,
            },
            Self::Project(e) => match e {
                ProjectError::UnknownProject(_)
                | ProjectError::DuplicateProject(_)
                | ProjectError::InvalidName(_) => ErrorKind::Validation,
                ProjectError::SwitchInProgress => ErrorKind::Precondition,
                ProjectError::Io(_) | ProjectError::Serialization(_) => ErrorKind::Internal,
            },
            Self::Vcs(e) => match e {
                VcsError::DirtyWorkspace { .. } => ErrorKind::Precondition,
                _ => ErrorKind::Collaborator,
            },
            Self::Collect(e) => match e {
                CollectError::NothingToCollect => ErrorKind::Precondition,
                CollectError::StashConflict { .. } => ErrorKind::PartialFailure,
                CollectError::Io(_) | CollectError::Serialization(_) => ErrorKind::Internal,
            },
            Self::Worker(_) => ErrorKind::Collaborator,
            Self::BadRequest(_) => ErrorKind::Validation,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Job {id} is not outstanding")]
    UnknownJob { id: Uuid },

    #[error("No planned jobs to dispatch. Make a plan first.")]
    NothingPlanned,
}

/// Plan catalog and instantiation errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Unknown plan: {plan_id}")]
    InvalidPlan { plan_id: String },

    #[error("Plan {plan_id} requires input '{input}'")]
    MissingInput { plan_id: String, input: String },

    #[error("Invalid plan name: {0}")]
    InvalidName(String),

    #[error("Plan '{0}' already exists")]
    AlreadyExists(String),

    #[error("Cannot read input '{input}' at {}: {reason}", path.display())]
    InputUnreadable {
        input: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid corpus line {line} in {}: {reason}", path.display())]
    InvalidCorpus {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Project store errors.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project not found: {0}")]
    UnknownProject(String),

    #[error("Project already exists: {0}")]
    DuplicateProject(String),

    #[error("Invalid project name: {0}")]
    InvalidName(String),

    #[error("A project switch is already in progress")]
    SwitchInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Versioning collaborator and consistency gate errors.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("Repository has uncommitted changes; commit before {operation} ({} files)", uncommitted_files.len())]
    DirtyWorkspace {
        operation: String,
        uncommitted_files: Vec<String>,
    },

    #[error("Versioning service unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("git {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("git {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Invalid response from versioning service: {0}")]
    InvalidResponse(String),
}

/// Result collection errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("No results to collect")]
    NothingToCollect,

    #[error(
        "Collected {} results to {} but could not restore stashed changes: {reason}. Resolve the stash manually.",
        record.count,
        record.filename
    )]
    StashConflict {
        record: Box<CollectionRecord>,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Worker pool errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("No handler registered for '{handler}'")]
    HandlerNotFound { handler: String },

    #[error("No idle worker available")]
    NoIdleWorker,

    #[error("Handler {handler} failed: {reason}")]
    Failed { handler: String, reason: String },
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
