use async_trait::async_trait;

use super::protocol::{decode_args, encode_output, FetchTaskArgs, FetchTaskOutput, FETCH_FEED};
use super::queue::TaskWorker;
use crate::feed::{parse_feed, FeedFetcher, FetchResult};
use crate::Result;

/// Worker side of the `fetch_feed` task.
///
/// Every failure is caught and encoded as `{"error": ...}`; nothing escapes
/// as a panic or a queue-level failure.
#[derive(Clone)]
pub struct FetchWorker {
    fetcher: FeedFetcher,
}

impl FetchWorker {
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch, parse and optionally look up the site image
    pub async fn fetch(&self, args: &FetchTaskArgs) -> Result<FetchTaskOutput> {
        let result = self
            .fetcher
            .fetch(
                &args.feed_url,
                args.etag.as_deref(),
                args.last_modified.as_deref(),
                args.use_discovery,
            )
            .await?;

        let raw = match result {
            FetchResult::NotModified => return Ok(FetchTaskOutput::not_modified(args.feed_id)),
            FetchResult::Fetched(raw) => raw,
        };

        let mut feed = parse_feed(raw);
        tracing::debug!(url = %feed.url, entries = feed.entries.len(), "Parsed feed");

        if args.find_image_url {
            let site = feed.link.as_deref().unwrap_or(&feed.url).to_string();
            feed.image_url = self.fetcher.discover_image(&site).await;
        }

        Ok(FetchTaskOutput::updated(args.feed_id, feed))
    }

    /// Run one encoded `fetch_feed` payload to an encoded result
    pub async fn run_payload(&self, payload: &str) -> String {
        let output = match decode_args(payload) {
            Ok(args) => match self.fetch(&args).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(url = %args.feed_url, error = %e, "Fetch task failed");
                    FetchTaskOutput::failed(e)
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Malformed fetch_feed payload");
                FetchTaskOutput::failed(e)
            }
        };

        encode_output(&output)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

#[async_trait]
impl TaskWorker for FetchWorker {
    async fn execute(&self, task: &str, payload: String) -> String {
        if task != FETCH_FEED {
            tracing::warn!("Unknown task: {}", task);
            return serde_json::json!({ "error": format!("unknown task: {}", task) }).to_string();
        }
        self.run_payload(&payload).await
    }
}
