use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedsync_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "feedsync")]
#[command(author, version, about = "Feed synchronization engine with scheduled background refresh")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update scheduler until interrupted
    Serve,
    /// Subscribe to a feed, or to the feed advertised by a web page
    Subscribe {
        /// Feed or page URL
        url: String,
    },
    /// Remove a subscription and its entries
    Unsubscribe {
        /// Feed URL or id
        feed: String,
    },
    /// List all subscriptions
    List {
        /// Also show the latest entries of each feed
        #[arg(short, long, default_value_t = 0)]
        entries: u32,
    },
    /// Refresh every feed now
    Refresh,
    /// Run a single fetch task and print its JSON result
    Fetch {
        url: String,
        #[arg(long)]
        etag: Option<String>,
        #[arg(long)]
        last_modified: Option<String>,
        /// Do not look for a feed link when the URL is an HTML page
        #[arg(long)]
        no_discovery: bool,
        /// Look up the site's favicon
        #[arg(long)]
        find_image: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Serve => commands::serve::run(config).await,
        Commands::Subscribe { url } => commands::subscribe::run(&config, &url).await,
        Commands::Unsubscribe { feed } => commands::unsubscribe::run(&config, &feed).await,
        Commands::List { entries } => commands::list::run(&config, entries).await,
        Commands::Refresh => commands::refresh::run(&config).await,
        Commands::Fetch {
            url,
            etag,
            last_modified,
            no_discovery,
            find_image,
        } => {
            let args = feedsync_core::task::FetchTaskArgs {
                feed_url: url,
                etag,
                last_modified,
                feed_id: None,
                find_image_url: find_image,
                use_discovery: !no_discovery,
            };
            commands::fetch::run(&config, &args).await
        }
    }
}
