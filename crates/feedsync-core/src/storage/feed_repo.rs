use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use super::entry_repo::insert_entry;
use super::Database;
use crate::feed::{Feed, NewFeed, ParsedEntry, ParsedFeed};
use crate::{Error, Result};

/// Repository for feed CRUD operations
pub struct FeedRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct FeedRow {
    id: String,
    feed_url: String,
    title: Option<String>,
    site_url: Option<String>,
    image_url: Option<String>,
    etag: Option<String>,
    last_modified: Option<String>,
    last_refresh_date: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            feed_url: row.feed_url,
            title: row.title,
            site_url: row.site_url,
            image_url: row.image_url,
            etag: row.etag,
            last_modified: row.last_modified,
            last_refresh_date: row.last_refresh_date,
            created_at: row.created_at,
        }
    }
}

const FEED_COLUMNS: &str = "id, feed_url, title, site_url, image_url, etag, last_modified, last_refresh_date, created_at";

async fn insert_feed<'e, E>(executor: E, id: Uuid, new_feed: &NewFeed) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO feeds (id, feed_url, title, site_url, image_url, etag, last_modified, last_refresh_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&new_feed.feed_url)
    .bind(&new_feed.title)
    .bind(&new_feed.site_url)
    .bind(&new_feed.image_url)
    .bind(&new_feed.etag)
    .bind(&new_feed.last_modified)
    .bind(new_feed.last_refresh_date)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

impl<'a> FeedRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new feed subscription
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let id = Uuid::new_v4();
        insert_feed(self.db.pool(), id, new_feed).await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            Error::FeedNotFound(id.to_string())
        })
    }

    /// Create a feed together with its first entries in one transaction.
    ///
    /// Nothing is stored if any insert fails.
    pub async fn create_with_entries(&self, new_feed: &NewFeed, entries: &[ParsedEntry]) -> Result<Feed> {
        let id = Uuid::new_v4();
        let mut tx = self.db.pool().begin().await?;

        insert_feed(&mut *tx, id, new_feed).await?;
        for entry in entries {
            insert_entry(&mut *tx, id, entry).await?;
        }

        tx.commit().await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            Error::FeedNotFound(id.to_string())
        })
    }

    /// Find a feed by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds WHERE id = ?",
            FEED_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Find a feed by its feed URL
    pub async fn find_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds WHERE feed_url = ?",
            FEED_COLUMNS
        ))
        .bind(url)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Get all feeds
    pub async fn list_all(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds ORDER BY created_at ASC, feed_url ASC",
            FEED_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Feeds last refreshed strictly before `cutoff` (epoch seconds), or never
    pub async fn find_stale_before(&self, cutoff: i64) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM feeds
            WHERE last_refresh_date IS NULL OR last_refresh_date < ?
            ORDER BY last_refresh_date ASC
            "#,
            FEED_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Record that a refresh was started at `now`
    pub async fn stamp_refresh_date(&self, id: Uuid, now: i64) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_refresh_date = ? WHERE id = ?")
            .bind(now)
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Store metadata and cache tokens from a successful fetch.
    ///
    /// Title and site link are only overwritten when the new fetch has them;
    /// cache tokens are always replaced.
    pub async fn update_after_fetch(&self, id: Uuid, parsed: &ParsedFeed) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET title = COALESCE(?, title),
                site_url = COALESCE(?, site_url),
                image_url = COALESCE(?, image_url),
                etag = ?,
                last_modified = ?,
                last_refresh_date = ?
            WHERE id = ?
            "#,
        )
        .bind(&parsed.title)
        .bind(&parsed.link)
        .bind(&parsed.image_url)
        .bind(&parsed.etag)
        .bind(&parsed.last_modified)
        .bind(parsed.last_refresh_date)
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Delete a feed and all its entries
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get total feed count
    pub async fn count(&self) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u32)
    }
}
