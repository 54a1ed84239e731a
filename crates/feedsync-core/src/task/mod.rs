//! Fetch work dispatched through a task queue
//!
//! [`TaskBridge`] submits `fetch_feed` tasks to a [`TaskQueue`] and hands the
//! caller a future; [`FetchWorker`] is the worker side that performs the
//! fetch and encodes its result.

mod bridge;
pub mod protocol;
mod queue;
mod worker;

pub use bridge::{TaskBridge, TaskFuture};
pub use protocol::{FetchTaskArgs, FetchTaskOutput, TaskOutcome, FETCH_FEED};
pub use queue::{build_queue, InProcessQueue, PendingTask, TaskQueue, TaskWorker, WorkerPoolQueue};
pub use worker::FetchWorker;
