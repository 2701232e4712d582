use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{NewEntry, Source};

/// The slice of persistence the ingestion engine depends on.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Least-recently-fetched source, never-fetched sources first.
    async fn next_source_to_fetch(&self) -> Result<Option<Source>>;

    /// Advance the source's watermark. Never moves it backwards.
    async fn mark_fetched(&self, source_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Store an entry, failing with `AppError::Duplicate` when its link is taken.
    async fn insert_entry(&self, entry: NewEntry) -> Result<i64>;
}
