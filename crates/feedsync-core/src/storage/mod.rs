mod database;
mod entry_repo;
mod feed_repo;

pub use database::Database;
pub use entry_repo::{EntryRepository, Upsert};
pub use feed_repo::FeedRepository;
