use std::collections::HashSet;

use crate::feed::{Feed, NewFeed, ParsedEntry};
use crate::storage::{Database, EntryRepository, FeedRepository, Upsert};
use crate::task::{FetchTaskArgs, TaskBridge, TaskOutcome};
use crate::{Error, Result};

/// Result of applying one fetch to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { inserted: u32, updated: u32 },
    NotModified,
    /// The fetch failed; the feed is left for the next cycle
    Failed(String),
}

/// Drop entries whose guid was already seen, keeping the first occurrence
pub fn dedupe_by_guid(entries: Vec<ParsedEntry>) -> Vec<ParsedEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.guid.clone()))
        .collect()
}

/// Apply the result of a refresh task to `feed`.
///
/// Task failures and timeouts are reported as [`MergeOutcome::Failed`]. A
/// payload that cannot be decoded is returned as an error.
pub async fn merge_update(db: &Database, feed: &Feed, result: Result<TaskOutcome>) -> Result<MergeOutcome> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e @ Error::TaskTransport(_)) => return Err(e),
        Err(e) => {
            tracing::warn!(feed = %feed.feed_url, error = %e, "Refresh task did not complete");
            return Ok(MergeOutcome::Failed(e.to_string()));
        }
    };

    let mut parsed = match outcome {
        TaskOutcome::Failed(error) => {
            tracing::warn!(feed = %feed.feed_url, "Failed to refresh feed: {}", error);
            return Ok(MergeOutcome::Failed(error));
        }
        TaskOutcome::NotModified { .. } => {
            tracing::debug!(feed = %feed.feed_url, "Feed not modified");
            return Ok(MergeOutcome::NotModified);
        }
        TaskOutcome::Updated { feed: parsed, .. } => parsed,
    };

    let entry_repo = EntryRepository::new(db);
    let mut inserted = 0;
    let mut updated = 0;

    for entry in dedupe_by_guid(std::mem::take(&mut parsed.entries)) {
        match entry_repo.upsert(feed.id, &entry).await? {
            Upsert::Inserted => inserted += 1,
            Upsert::Updated => updated += 1,
        }
    }

    FeedRepository::new(db).update_after_fetch(feed.id, &parsed).await?;

    tracing::info!(
        "Feed '{}': {} new entries, {} updated",
        feed.display_name(),
        inserted,
        updated
    );

    Ok(MergeOutcome::Merged { inserted, updated })
}

/// Subscribe to `url`, fetching it for the first time.
///
/// Returns the stored feed when the URL, or the canonical URL it resolves
/// to, is already subscribed.
pub async fn subscribe(db: &Database, bridge: &TaskBridge, url: &str) -> Result<Feed> {
    let feed_repo = FeedRepository::new(db);

    if let Some(existing) = feed_repo.find_by_url(url).await? {
        tracing::info!("Already subscribed to {}", url);
        return Ok(existing);
    }

    let outcome = bridge
        .run(&FetchTaskArgs::subscribe(url))?
        .await
        .map_err(|e| match e {
            Error::TaskTransport(_) => e,
            other => Error::Subscribe(other.to_string()),
        })?;

    let mut parsed = match outcome {
        TaskOutcome::Updated { feed, .. } => feed,
        TaskOutcome::Failed(error) => return Err(Error::Subscribe(error)),
        TaskOutcome::NotModified { .. } => {
            return Err(Error::Subscribe(format!(
                "{} answered 'not modified' to an unconditional request",
                url
            )))
        }
    };

    if let Some(existing) = feed_repo.find_by_url(&parsed.url).await? {
        tracing::info!("{} resolves to already subscribed feed {}", url, parsed.url);
        return Ok(existing);
    }

    let entries = dedupe_by_guid(std::mem::take(&mut parsed.entries));
    let count = entries.len();
    let feed = feed_repo.create_with_entries(&NewFeed::from(&parsed), &entries).await?;

    tracing::info!("Subscribed to '{}' with {} entries", feed.display_name(), count);
    Ok(feed)
}
