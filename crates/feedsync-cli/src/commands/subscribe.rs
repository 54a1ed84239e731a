use anyhow::Result;

use feedsync_core::scheduler::subscribe;
use feedsync_core::storage::{Database, EntryRepository};
use feedsync_core::AppConfig;

pub async fn run(config: &AppConfig, url: &str) -> Result<()> {
    println!("Subscribing to: {}", url);

    let db = Database::new(config).await?;
    let bridge = super::task_bridge(config)?;

    let feed = subscribe(&db, &bridge, url).await?;
    let count = EntryRepository::new(&db).count_for_feed(feed.id).await?;

    println!("Subscribed to '{}' ({})", feed.display_name(), feed.id);
    println!("  Feed URL: {}", feed.feed_url);
    if let Some(site) = &feed.site_url {
        println!("  Site: {}", site);
    }
    println!("  Entries: {}", count);

    Ok(())
}
