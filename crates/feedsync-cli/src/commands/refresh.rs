use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use feedsync_core::scheduler::{SchedulerEvent, UpdateScheduler};
use feedsync_core::storage::Database;
use feedsync_core::AppConfig;

pub async fn run(config: &AppConfig) -> Result<()> {
    println!("Refreshing all feeds...\n");

    let db = Arc::new(Database::new(config).await?);
    let bridge = super::task_bridge(config)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = UpdateScheduler::new(db, bridge, &config.sync).with_event_sender(tx);

    let refreshed = scheduler.refresh_all().await?;
    drop(scheduler);

    let mut new_entries = 0;
    let mut failed = 0;
    while let Some(event) = rx.recv().await {
        match event {
            SchedulerEvent::FeedRefreshed { new_entries: n, .. } => new_entries += n,
            SchedulerEvent::FeedNotModified { .. } => {}
            SchedulerEvent::Error { feed_id, message } => {
                failed += 1;
                println!("  {}: {}", feed_id, message);
            }
        }
    }

    println!(
        "\nRefresh complete. {} feeds, {} new entries, {} failed.",
        refreshed, new_entries, failed
    );

    Ok(())
}
