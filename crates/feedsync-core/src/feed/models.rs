use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feed-level data produced by a single fetch
///
/// Entries are carried separately on the task wire format, so they are
/// skipped when the feed itself is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// Canonical feed resource (after redirects and discovery)
    pub url: String,
    /// Link to the site the feed belongs to
    pub link: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Epoch seconds at parse completion
    pub last_refresh_date: i64,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub entries: Vec<ParsedEntry>,
}

/// A normalized feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub author: Option<String>,
    /// HTML content, escaped when the source was not HTML
    pub content: String,
    /// Epoch seconds
    pub date: i64,
    pub title: Option<String>,
    pub link: Option<String>,
    /// SHA-1 hex digest of the entry's identity string
    pub guid: String,
}

/// A subscribed feed as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub feed_url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub image_url: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Epoch seconds; `None` until the first refresh is stamped
    pub last_refresh_date: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Data required to create a new feed
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub feed_url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub image_url: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_refresh_date: Option<i64>,
}

impl From<&ParsedFeed> for NewFeed {
    fn from(parsed: &ParsedFeed) -> Self {
        Self {
            feed_url: parsed.url.clone(),
            title: parsed.title.clone(),
            site_url: parsed.link.clone(),
            image_url: parsed.image_url.clone(),
            etag: parsed.etag.clone(),
            last_modified: parsed.last_modified.clone(),
            last_refresh_date: Some(parsed.last_refresh_date),
        }
    }
}

/// A stored entry, unique per `(feed_id, guid)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub guid: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub content: String,
    pub date: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    /// Whether the feed was last refreshed before `cutoff` (epoch seconds)
    pub fn is_stale(&self, cutoff: i64) -> bool {
        self.last_refresh_date.map_or(true, |date| date < cutoff)
    }

    /// Name shown in logs and listings
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.feed_url)
    }
}
