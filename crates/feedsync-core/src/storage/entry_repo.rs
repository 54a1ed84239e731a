use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use super::Database;
use crate::feed::{Entry, ParsedEntry};
use crate::{Error, Result};

/// Repository for entry persistence, keyed by `(feed_id, guid)`
pub struct EntryRepository<'a> {
    db: &'a Database,
}

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

#[derive(FromRow)]
struct EntryRow {
    id: String,
    feed_id: String,
    guid: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    content: String,
    date: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            feed_id: Uuid::parse_str(&row.feed_id).unwrap_or_default(),
            guid: row.guid,
            title: row.title,
            url: row.url,
            author: row.author,
            content: row.content,
            date: row.date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) async fn insert_entry<'e, E>(executor: E, feed_id: Uuid, entry: &ParsedEntry) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO entries (id, feed_id, guid, title, url, author, content, date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(feed_id.to_string())
    .bind(&entry.guid)
    .bind(&entry.title)
    .bind(&entry.link)
    .bind(&entry.author)
    .bind(&entry.content)
    .bind(entry.date)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

impl<'a> EntryRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn find_by_guid(&self, feed_id: Uuid, guid: &str) -> Result<Option<Entry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, guid, title, url, author, content, date, created_at, updated_at
            FROM entries
            WHERE feed_id = ? AND guid = ?
            "#,
        )
        .bind(feed_id.to_string())
        .bind(guid)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Entry::from))
    }

    /// Insert a new entry; fails if the guid already exists for the feed
    pub async fn insert(&self, feed_id: Uuid, entry: &ParsedEntry) -> Result<Entry> {
        insert_entry(self.db.pool(), feed_id, entry).await?;

        self.find_by_guid(feed_id, &entry.guid)
            .await?
            .ok_or_else(|| Error::Other(format!("entry {} vanished after insert", entry.guid)))
    }

    /// Overwrite the stored fields of an existing entry. Returns false when
    /// no row matched.
    pub async fn update(&self, feed_id: Uuid, entry: &ParsedEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE entries
            SET title = ?,
                url = ?,
                author = ?,
                content = ?,
                date = ?,
                updated_at = ?
            WHERE feed_id = ? AND guid = ?
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.author)
        .bind(&entry.content)
        .bind(entry.date)
        .bind(Utc::now())
        .bind(feed_id.to_string())
        .bind(&entry.guid)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert the entry, or update it in place if its guid is already stored
    pub async fn upsert(&self, feed_id: Uuid, entry: &ParsedEntry) -> Result<Upsert> {
        let now = Utc::now();

        // Try to insert, ignore if duplicate (feed_id, guid)
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO entries (id, feed_id, guid, title, url, author, content, date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(feed_id.to_string())
        .bind(&entry.guid)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.author)
        .bind(&entry.content)
        .bind(entry.date)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(Upsert::Inserted);
        }

        self.update(feed_id, entry).await?;
        Ok(Upsert::Updated)
    }

    pub async fn count_for_feed(&self, feed_id: Uuid) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE feed_id = ?")
            .bind(feed_id.to_string())
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u32)
    }

    /// Entries of a feed, newest first
    pub async fn list_by_feed(&self, feed_id: Uuid, limit: u32) -> Result<Vec<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, guid, title, url, author, content, date, created_at, updated_at
            FROM entries
            WHERE feed_id = ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(feed_id.to_string())
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Entry::from).collect())
    }
}
