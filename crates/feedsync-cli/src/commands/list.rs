use anyhow::Result;
use chrono::{TimeZone, Utc};

use feedsync_core::storage::{Database, EntryRepository, FeedRepository};
use feedsync_core::AppConfig;

pub async fn run(config: &AppConfig, entries: u32) -> Result<()> {
    let db = Database::new(config).await?;
    let feed_repo = FeedRepository::new(&db);
    let entry_repo = EntryRepository::new(&db);
    let feeds = feed_repo.list_all().await?;

    if feeds.is_empty() {
        println!("No subscriptions yet.");
        println!("\nTo subscribe to a feed, run:");
        println!("  feedsync subscribe <url>");
        return Ok(());
    }

    println!("Subscriptions ({}):\n", feeds.len());

    for feed in &feeds {
        let count = entry_repo.count_for_feed(feed.id).await?;
        let title = feed.title.as_deref().unwrap_or("(no title)");

        println!("  {} ({} entries)", title, count);
        println!("    URL: {}", feed.feed_url);
        println!("    Id: {}", feed.id);
        if let Some(last) = feed.last_refresh_date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
            println!("    Last refreshed: {}", last.format("%Y-%m-%d %H:%M"));
        }

        if entries > 0 {
            for entry in entry_repo.list_by_feed(feed.id, entries).await? {
                let when = Utc
                    .timestamp_opt(entry.date, 0)
                    .single()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("      {} {}", when, entry.title.as_deref().unwrap_or("(untitled)"));
            }
        }
        println!();
    }

    Ok(())
}
