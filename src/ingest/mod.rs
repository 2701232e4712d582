//! The fetch → parse → normalize → store pipeline and the loop that drives it.

mod scheduler;

pub use scheduler::{run_scheduler, Scheduler, Shutdown};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::db::SourceStore;
use crate::error::{AppError, Result};
use crate::feed::{self, DocumentFetcher};
use crate::models::{NewEntry, Source};

/// Outcome of one pass over a single source.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub source_id: i64,
    /// Items present in the fetched document.
    pub fetched_count: usize,
    pub stored_count: usize,
    pub duplicate_count: usize,
    /// Items dropped before reaching the store (bad date, no link).
    pub skipped_count: usize,
    /// Items the store rejected for a reason other than duplication.
    pub failed_count: usize,
    /// Set when the pass stopped early (watermark, fetch or parse failure).
    pub error: Option<AppError>,
}

impl IngestReport {
    fn new(source_id: i64) -> Self {
        Self {
            source_id,
            ..Self::default()
        }
    }

    fn abort(mut self, err: AppError) -> Self {
        self.error = Some(err);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Ingestor<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
}

impl<S, F> Ingestor<S, F>
where
    S: SourceStore,
    F: DocumentFetcher,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self { store, fetcher }
    }

    /// Pick the least-recently-fetched source and ingest it.
    ///
    /// Returns `Ok(None)` when no source is registered.
    pub async fn run_cycle(&self) -> Result<Option<IngestReport>> {
        let Some(source) = self.store.next_source_to_fetch().await? else {
            info!("No sources registered, nothing to collect");
            return Ok(None);
        };

        Ok(Some(self.ingest_one(&source, Utc::now()).await))
    }

    /// Ingest a single source.
    ///
    /// The watermark is advanced to `started_at` before anything is fetched,
    /// so a failing source moves to the back of the rotation. Entries are
    /// stored one by one and stay stored if a later item fails.
    pub async fn ingest_one(&self, source: &Source, started_at: DateTime<Utc>) -> IngestReport {
        let mut report = IngestReport::new(source.id);

        if let Err(e) = self.store.mark_fetched(source.id, started_at).await {
            return report.abort(e);
        }

        let bytes = match self.fetcher.fetch(&source.url).await {
            Ok(bytes) => bytes,
            Err(e) => return report.abort(e),
        };

        let document = match feed::parse(&bytes) {
            Ok(document) => document,
            Err(e) => return report.abort(e),
        };

        report.fetched_count = document.items.len();
        info!(
            "Feed {} collected, {} posts found",
            source.name, report.fetched_count
        );

        for item in document.items {
            if item.link.is_empty() {
                warn!("Skipping {:?} from {}: item has no link", item.title, source.name);
                report.skipped_count += 1;
                continue;
            }

            let published_at = match feed::normalize_date(&item.pub_date) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("Skipping {}: {}", item.link, e);
                    report.skipped_count += 1;
                    continue;
                }
            };

            let link = item.link.clone();
            let entry = NewEntry::new(
                source.id,
                item.title,
                item.link,
                item.description,
                published_at,
            );

            match self.store.insert_entry(entry).await {
                Ok(_) => report.stored_count += 1,
                Err(AppError::Duplicate(_)) => {
                    debug!("Already stored {}", link);
                    report.duplicate_count += 1;
                }
                Err(e) => {
                    error!("Couldn't store {}: {}", link, e);
                    report.failed_count += 1;
                }
            }
        }

        info!(
            source = %source.name,
            stored = report.stored_count,
            duplicates = report.duplicate_count,
            skipped = report.skipped_count,
            failed = report.failed_count,
            "Cycle finished"
        );

        report
    }
}
