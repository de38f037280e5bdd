//! Result collection.
//!
//! - `record`: `CollectionRecord` and the per-project `collections.jsonl` log
//! - `artifact`: artifact naming and JSONL writing
//! - `coordinator`: `CollectionCoordinator`, the clean/stash/force policies

pub mod artifact;
pub mod coordinator;
pub mod record;

pub use coordinator::CollectionCoordinator;
pub use record::{CollectMode, CollectionRecord, RecordLog};
