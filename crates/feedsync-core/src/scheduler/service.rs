use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::feed::Feed;
use crate::storage::{Database, FeedRepository};
use crate::task::{FetchTaskArgs, TaskBridge};
use crate::Result;

use super::tasks::{merge_update, MergeOutcome};

/// Events emitted by the scheduler as refreshes complete
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// New or changed entries were stored
    FeedRefreshed { feed_id: Uuid, new_entries: u32, updated_entries: u32 },
    /// The server reported no change since the last fetch
    FeedNotModified { feed_id: Uuid },
    /// A refresh failed; the feed will be retried once it is stale again
    Error { feed_id: Uuid, message: String },
}

/// Periodically refreshes stale feeds through the task bridge
#[derive(Clone)]
pub struct UpdateScheduler {
    db: Arc<Database>,
    bridge: Arc<TaskBridge>,
    check_interval: Duration,
    update_period: Duration,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl UpdateScheduler {
    pub fn new(db: Arc<Database>, bridge: Arc<TaskBridge>, config: &SyncConfig) -> Self {
        Self {
            db,
            bridge,
            check_interval: config.check_interval(),
            update_period: config.update_period(),
            event_tx: None,
        }
    }

    /// Set the event sender for refresh notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Check for stale feeds every `check_interval` until shutdown.
    ///
    /// The first check runs immediately. An interval of zero disables the
    /// scheduler.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.check_interval.is_zero() {
            info!("Scheduler disabled (check_interval_secs = 0)");
            return;
        }

        info!(
            "Scheduler started: check={}s, update_period={}s",
            self.check_interval.as_secs(),
            self.update_period.as_secs()
        );

        let mut interval = tokio::time::interval(self.check_interval);

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    match self.do_updates().await {
                        Ok(dispatched) if !dispatched.is_empty() => {
                            debug!("Dispatched {} feed refreshes", dispatched.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Scheduled update check failed: {}", e),
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Refresh every feed not refreshed within the update period.
    ///
    /// Returns the handles of the dispatched merges without waiting on them.
    pub async fn do_updates(&self) -> Result<Vec<JoinHandle<()>>> {
        let cutoff = Utc::now().timestamp() - self.update_period.as_secs() as i64;
        let stale = FeedRepository::new(&self.db).find_stale_before(cutoff).await?;

        let mut handles = Vec::with_capacity(stale.len());
        for feed in &stale {
            match self.force_update(feed).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(feed = %feed.feed_url, "Failed to dispatch refresh: {}", e);
                    self.send_event(SchedulerEvent::Error {
                        feed_id: feed.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(handles)
    }

    /// Dispatch a refresh of `feed` now, regardless of staleness.
    ///
    /// The refresh date is stamped before the task is submitted so that a
    /// concurrent check does not dispatch the same feed twice.
    pub async fn force_update(&self, feed: &Feed) -> Result<JoinHandle<()>> {
        FeedRepository::new(&self.db)
            .stamp_refresh_date(feed.id, Utc::now().timestamp())
            .await?;

        debug!("Refreshing feed: {}", feed.display_name());

        let args = FetchTaskArgs::refresh(
            feed.id,
            feed.feed_url.clone(),
            feed.etag.clone(),
            feed.last_modified.clone(),
        );
        let future = self.bridge.run(&args)?;

        let scheduler = self.clone();
        let feed = feed.clone();
        Ok(tokio::spawn(async move {
            let result = future.await;
            match merge_update(&scheduler.db, &feed, result).await {
                Ok(MergeOutcome::Merged { inserted, updated }) => {
                    scheduler.send_event(SchedulerEvent::FeedRefreshed {
                        feed_id: feed.id,
                        new_entries: inserted,
                        updated_entries: updated,
                    });
                }
                Ok(MergeOutcome::NotModified) => {
                    scheduler.send_event(SchedulerEvent::FeedNotModified { feed_id: feed.id });
                }
                Ok(MergeOutcome::Failed(message)) => {
                    scheduler.send_event(SchedulerEvent::Error {
                        feed_id: feed.id,
                        message,
                    });
                }
                Err(e) => {
                    error!(feed = %feed.feed_url, "Failed to merge refresh: {}", e);
                    scheduler.send_event(SchedulerEvent::Error {
                        feed_id: feed.id,
                        message: e.to_string(),
                    });
                }
            }
        }))
    }

    /// Refresh every subscribed feed and wait for all merges to finish
    pub async fn refresh_all(&self) -> Result<usize> {
        let feeds = FeedRepository::new(&self.db).list_all().await?;

        let mut handles = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            handles.push(self.force_update(feed).await?);
        }

        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Refresh task panicked: {}", e);
            }
        }

        Ok(count)
    }
}
