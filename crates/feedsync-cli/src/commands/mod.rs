use std::sync::Arc;

use anyhow::Result;

use feedsync_core::feed::FeedFetcher;
use feedsync_core::task::{build_queue, FetchWorker, TaskBridge};
use feedsync_core::AppConfig;

pub mod fetch;
pub mod list;
pub mod refresh;
pub mod serve;
pub mod subscribe;
pub mod unsubscribe;

/// Task bridge backed by the queue selected in the configuration
pub fn task_bridge(config: &AppConfig) -> Result<Arc<TaskBridge>> {
    let worker = Arc::new(FetchWorker::new(FeedFetcher::new(config)?));
    let queue = build_queue(&config.queue, worker)?;
    Ok(Arc::new(TaskBridge::from_config(queue, &config.sync)))
}
