use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Feed unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to download or parse feed: {0}")]
    Unparsable(String),

    #[error("Malformed task payload: {0}")]
    TaskTransport(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Task did not complete within {0:?}")]
    TaskTimeout(std::time::Duration),

    #[error("Failed to subscribe: {0}")]
    Subscribe(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
