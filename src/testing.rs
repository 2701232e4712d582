//! In-process doubles for the store and fetcher seams, used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::db::SourceStore;
use crate::error::{AppError, Result};
use crate::feed::DocumentFetcher;
use crate::models::{Entry, NewEntry, Source};

#[derive(Default)]
struct MemoryState {
    sources: Vec<Source>,
    entries: Vec<Entry>,
    failing_links: HashSet<String>,
    fail_mark_fetched: bool,
    mark_attempts: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn with_sources(urls: &[&str]) -> Self {
        let store = Self::default();
        for url in urls {
            store.add_source(url);
        }
        store
    }

    pub fn add_source(&self, url: &str) -> Source {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let source = Source {
            id: state.sources.len() as i64 + 1,
            name: url.to_string(),
            url: url.to_string(),
            user_id: 1,
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };
        state.sources.push(source.clone());
        source
    }

    pub fn set_last_fetched(&self, source_id: i64, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(source) = state.sources.iter_mut().find(|s| s.id == source_id) {
            source.last_fetched_at = Some(at);
        }
    }

    /// Make inserts of this link fail with a non-duplicate store error.
    pub fn fail_inserts_for(&self, link: &str) {
        self.state.lock().unwrap().failing_links.insert(link.to_string());
    }

    /// Make every watermark write fail with a store error.
    pub fn fail_mark_fetched(&self) {
        self.state.lock().unwrap().fail_mark_fetched = true;
    }

    /// Number of `mark_fetched` calls, failed ones included.
    pub fn mark_attempts(&self) -> usize {
        self.state.lock().unwrap().mark_attempts
    }

    pub fn source(&self, source_id: i64) -> Source {
        let state = self.state.lock().unwrap();
        state
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .unwrap()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().unwrap().entries.clone()
    }

    pub fn entry_titles(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.title).collect()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn next_source_to_fetch(&self) -> Result<Option<Source>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sources
            .iter()
            .min_by_key(|s| (s.last_fetched_at, s.id))
            .cloned())
    }

    async fn mark_fetched(&self, source_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mark_attempts += 1;
        if state.fail_mark_fetched {
            return Err(AppError::Database(tokio_rusqlite::Error::ConnectionClosed));
        }
        if let Some(source) = state.sources.iter_mut().find(|s| s.id == source_id) {
            if source.last_fetched_at.map_or(true, |prev| prev <= at) {
                source.last_fetched_at = Some(at);
                source.updated_at = at;
            }
        }
        Ok(())
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if state.failing_links.contains(&entry.url) {
            return Err(AppError::Database(tokio_rusqlite::Error::ConnectionClosed));
        }
        if state.entries.iter().any(|e| e.url == entry.url) {
            return Err(AppError::Duplicate(entry.url));
        }
        let id = state.entries.len() as i64 + 1;
        let now = Utc::now();
        state.entries.push(Entry {
            id,
            source_id: entry.source_id,
            title: entry.title,
            url: entry.url,
            description: entry.description,
            published_at: entry.published_at,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }
}

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    Fail(String),
}

#[derive(Default)]
struct FetchLog {
    calls: Vec<(String, Instant)>,
}

/// Canned responses keyed by URL, with an optional artificial delay.
#[derive(Default)]
pub struct StubFetcher {
    replies: HashMap<String, Reply>,
    delays: Mutex<HashMap<String, Vec<Duration>>>,
    log: Mutex<FetchLog>,
    stop_after: Option<(usize, watch::Sender<bool>)>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, body: &str) -> Self {
        self.replies
            .insert(url.to_string(), Reply::Body(body.as_bytes().to_vec()));
        self
    }

    pub fn fail(mut self, url: &str, reason: &str) -> Self {
        self.replies
            .insert(url.to_string(), Reply::Fail(reason.to_string()));
        self
    }

    /// Delay successive fetches of `url` by the given durations, in order.
    pub fn delay(self, url: &str, delays: &[Duration]) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(url.to_string(), delays.iter().rev().copied().collect());
        self
    }

    /// Trigger `sender` once `calls` fetches have completed.
    pub fn stop_after(mut self, calls: usize, sender: watch::Sender<bool>) -> Self {
        self.stop_after = Some((calls, sender));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        let log = self.log.lock().unwrap();
        log.calls.iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        let log = self.log.lock().unwrap();
        log.calls.iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl DocumentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let count = {
            let mut log = self.log.lock().unwrap();
            log.calls.push((url.to_string(), Instant::now()));
            log.calls.len()
        };

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|pending| pending.pop());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((limit, sender)) = &self.stop_after {
            if count >= *limit {
                let _ = sender.send(true);
            }
        }

        match self.replies.get(url) {
            Some(Reply::Body(body)) => Ok(body.clone()),
            Some(Reply::Fail(reason)) => Err(AppError::Fetch(reason.clone())),
            None => Err(AppError::Fetch(format!("HTTP 404 Not Found for {}", url))),
        }
    }
}

/// Render a minimal RSS document from `(title, link, pubDate)` triples.
pub fn rss_document(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{}</title><link>{}</link><description>About {}</description><pubDate>{}</pubDate></item>",
                title, link, title, date
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test</title><link>http://x/</link><description>Test feed</description>{}</channel></rss>"#,
        body
    )
}
