use anyhow::Result;
use uuid::Uuid;

use feedsync_core::storage::{Database, FeedRepository};
use feedsync_core::AppConfig;

pub async fn run(config: &AppConfig, feed: &str) -> Result<()> {
    let db = Database::new(config).await?;
    let feed_repo = FeedRepository::new(&db);

    // Accept either an id or a feed URL
    let found = match Uuid::parse_str(feed) {
        Ok(id) => feed_repo.find_by_id(id).await?,
        Err(_) => feed_repo.find_by_url(feed).await?,
    };

    match found {
        Some(f) => {
            feed_repo.delete(f.id).await?;
            println!("Unsubscribed from: {}", f.display_name());
        }
        None => {
            println!("Feed '{}' not found.", feed);
            println!("\nAvailable subscriptions:");
            for f in feed_repo.list_all().await? {
                println!("  - {} ({})", f.feed_url, f.id);
            }
        }
    }

    Ok(())
}
