mod discovery;
mod fetcher;
mod models;
mod parser;

pub use discovery::find_feed_link;
pub use fetcher::{validate_url, FeedFetcher, FetchResult, RawFeed};
pub use models::{Entry, Feed, NewFeed, ParsedEntry, ParsedFeed};
pub use parser::{compute_guid, parse_feed};
