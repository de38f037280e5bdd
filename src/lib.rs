//! Work orchestrator: plans, dispatches and collects batches of jobs
//! against a version-controlled workspace.

pub mod api;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod plans;
pub mod project;
pub mod vcs;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;
