//! Wire format of the fetch task
//!
//! Arguments and results cross the queue boundary as JSON strings. Results
//! are either a parsed feed with its entries, an empty "not modified"
//! payload (`feed: null`), or `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::{ParsedEntry, ParsedFeed};
use crate::{Error, Result};

/// Name under which the fetch task is registered with a queue
pub const FETCH_FEED: &str = "fetch_feed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTaskArgs {
    pub feed_url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Echoed back in the output so the caller can match results to feeds
    pub feed_id: Option<Uuid>,
    #[serde(default)]
    pub find_image_url: bool,
    #[serde(default = "default_use_discovery")]
    pub use_discovery: bool,
}

fn default_use_discovery() -> bool {
    true
}

impl FetchTaskArgs {
    /// First fetch of a URL: discovery and favicon lookup enabled
    pub fn subscribe(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            etag: None,
            last_modified: None,
            feed_id: None,
            find_image_url: true,
            use_discovery: true,
        }
    }

    /// Scheduled refresh of a known feed using its stored cache tokens
    pub fn refresh(
        feed_id: Uuid,
        feed_url: impl Into<String>,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            etag,
            last_modified,
            feed_id: Some(feed_id),
            find_image_url: false,
            use_discovery: false,
        }
    }
}

/// Raw task output as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchTaskOutput {
    Failed {
        error: String,
    },
    Completed {
        feed: Option<ParsedFeed>,
        entries: Vec<ParsedEntry>,
        #[serde(default)]
        feed_id: Option<Uuid>,
    },
}

/// Decoded result of a fetch task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The feed was fetched and parsed; entries are in `feed.entries`
    Updated { feed_id: Option<Uuid>, feed: ParsedFeed },
    /// The server answered 304 for the supplied cache tokens
    NotModified { feed_id: Option<Uuid> },
    /// The worker caught an error and encoded it
    Failed(String),
}

impl FetchTaskOutput {
    pub fn updated(feed_id: Option<Uuid>, mut feed: ParsedFeed) -> Self {
        let entries = std::mem::take(&mut feed.entries);
        Self::Completed {
            feed: Some(feed),
            entries,
            feed_id,
        }
    }

    pub fn not_modified(feed_id: Option<Uuid>) -> Self {
        Self::Completed {
            feed: None,
            entries: Vec::new(),
            feed_id,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }
}

impl From<FetchTaskOutput> for TaskOutcome {
    fn from(output: FetchTaskOutput) -> Self {
        match output {
            FetchTaskOutput::Failed { error } => TaskOutcome::Failed(error),
            FetchTaskOutput::Completed { feed: None, feed_id, .. } => {
                TaskOutcome::NotModified { feed_id }
            }
            FetchTaskOutput::Completed {
                feed: Some(mut feed),
                entries,
                feed_id,
            } => {
                feed.entries = entries;
                TaskOutcome::Updated { feed_id, feed }
            }
        }
    }
}

pub fn encode_args(args: &FetchTaskArgs) -> Result<String> {
    Ok(serde_json::to_string(args)?)
}

pub fn decode_args(payload: &str) -> Result<FetchTaskArgs> {
    serde_json::from_str(payload)
        .map_err(|e| Error::TaskTransport(format!("invalid task arguments: {}", e)))
}

pub fn encode_output(output: &FetchTaskOutput) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}

pub fn decode_output(payload: &str) -> Result<TaskOutcome> {
    serde_json::from_str::<FetchTaskOutput>(payload)
        .map(TaskOutcome::from)
        .map_err(|e| Error::TaskTransport(format!("invalid task output: {}", e)))
}
