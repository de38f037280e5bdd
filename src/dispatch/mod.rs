//! Dispatcher: play/pause, promotion to the queue, and the scheduling loop.
//!
//! Two background tasks drive execution:
//! - the scheduling loop, the only code that claims queued jobs
//! - the completion funnel, which applies worker callbacks under the owning
//!   project's lock

pub mod dispatcher;

pub use dispatcher::Dispatcher;
