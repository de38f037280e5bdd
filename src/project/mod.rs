//! Projects: isolated workspaces, one active at a time.
//!
//! - `model`: `Project` and the `projects.json` registry format
//! - `state`: `ProjectRuntime`, the per-project lock domain
//! - `store`: `ProjectStore`, create/switch with an explicit switching state

pub mod model;
pub mod state;
pub mod store;

pub use model::{DEFAULT_PROJECT, Project};
pub use state::{PlanMetadata, ProjectRuntime, ProjectSnapshot, ProjectState, WorkState};
pub use store::{ProjectListing, ProjectStore, SwitchOutcome, SwitchStart, SwitchTicket};
