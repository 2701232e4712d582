//! Retrieval and decoding of syndication documents.

pub mod date;
mod fetcher;
mod parser;

pub use date::normalize as normalize_date;
pub use fetcher::{validate_url, DocumentFetcher, FetcherSettings, HttpFetcher};
pub use parser::{parse, RawDocument, RawItem};
