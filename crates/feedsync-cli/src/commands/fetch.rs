use anyhow::Result;

use feedsync_core::feed::FeedFetcher;
use feedsync_core::task::protocol::encode_args;
use feedsync_core::task::{FetchTaskArgs, FetchWorker};
use feedsync_core::AppConfig;

/// Run the fetch task in this process and print the encoded result
pub async fn run(config: &AppConfig, args: &FetchTaskArgs) -> Result<()> {
    let worker = FetchWorker::new(FeedFetcher::new(config)?);
    let output = worker.run_payload(&encode_args(args)?).await;

    let value: serde_json::Value = serde_json::from_str(&output)?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}
