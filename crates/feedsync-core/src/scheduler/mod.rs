mod service;
pub mod tasks;

pub use service::{SchedulerEvent, UpdateScheduler};
pub use tasks::{dedupe_by_guid, merge_update, subscribe, MergeOutcome};
