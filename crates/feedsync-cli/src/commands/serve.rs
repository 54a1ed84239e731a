use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use feedsync_core::scheduler::{SchedulerEvent, UpdateScheduler};
use feedsync_core::storage::Database;
use feedsync_core::AppConfig;

/// Run the scheduler until Ctrl+C
pub async fn run(config: AppConfig) -> Result<()> {
    let db = Arc::new(Database::new(&config).await?);
    let bridge = super::task_bridge(&config)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Setup signal handler for graceful shutdown
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::FeedRefreshed { feed_id, new_entries, updated_entries } => {
                    info!(%feed_id, new_entries, updated_entries, "Feed refreshed");
                }
                SchedulerEvent::FeedNotModified { .. } => {}
                SchedulerEvent::Error { feed_id, message } => {
                    warn!(%feed_id, "Refresh failed: {}", message);
                }
            }
        }
    });

    let scheduler = UpdateScheduler::new(db, bridge, &config.sync).with_event_sender(event_tx);

    println!("feedsync started. Press Ctrl+C to stop.");
    println!("  Check interval: {} seconds", config.sync.check_interval_secs);
    println!("  Update period: {} seconds", config.sync.update_period_secs);

    // Run scheduler (blocks until shutdown)
    scheduler.run(shutdown_rx).await;

    println!("feedsync stopped.");
    Ok(())
}
