use crate::models::{ClickEvent, Link, MinuteRow, NewLink};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Source of truth for links
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// List every stored link, newest first
    async fn get_all(&self) -> Result<Vec<Link>>;

    /// Get a link by short code
    async fn get(&self, short_code: &str) -> Result<Option<Link>>;

    /// Persist a link under its (already chosen) short code.
    ///
    /// The store assigns `created_at`. Fails with [`StorageError::Conflict`]
    /// instead of overwriting an existing code.
    async fn create(&self, link: &NewLink) -> StorageResult<Link>;

    /// Check whether a short code is taken
    async fn exists(&self, short_code: &str) -> Result<bool>;
}

/// Append-only click storage
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Initialize click storage
    async fn init_analytics(&self) -> Result<()>;

    /// Insert all events in one batch, returning the number of rows written
    async fn insert_batch(&self, events: &[ClickEvent]) -> Result<u64>;

    /// Open a read-only view that observes a single version of the data
    async fn read_snapshot(&self) -> Result<Box<dyn AnalyticsReader>>;
}

/// Queries that run against one consistent analytics snapshot
#[async_trait]
pub trait AnalyticsReader: Send + Sync {
    /// Number of distinct user agents ever recorded for the code
    async fn unique_user_agents(&self, short_code: &str) -> Result<i64>;

    /// Clicks grouped by minute and user agent, newest minute first
    async fn minute_rows(&self, short_code: &str) -> Result<Vec<MinuteRow>>;
}
