use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Something that can turn a source URL into raw document bytes.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub max_document_bytes: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "gator".to_string(),
            max_document_bytes: 5 * 1024 * 1024,
        }
    }
}

impl From<&Config> for FetcherSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout(),
            connect_timeout: config.connect_timeout(),
            user_agent: config.user_agent.clone(),
            max_document_bytes: config.max_document_bytes,
        }
    }
}

/// Single-shot HTTP GET fetcher. Retries happen on the next rotation turn.
pub struct HttpFetcher {
    client: Client,
    max_document_bytes: u64,
}

impl HttpFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| AppError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_document_bytes: settings.max_document_bytes,
        })
    }

    fn check_size(&self, len: u64) -> Result<()> {
        if len > self.max_document_bytes {
            return Err(AppError::Fetch(format!(
                "document too large: {} bytes (max {} bytes)",
                len, self.max_document_bytes
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        validate_url(url)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!("HTTP {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            self.check_size(content_length)?;
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Fetch(format!("failed to read response body: {}", e)))?;
        self.check_size(bytes.len() as u64)?;

        tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| AppError::Fetch(format!("invalid URL {}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Fetch(format!("unsupported URL scheme: {}", scheme)));
        }
    }

    if parsed.host_str().is_none() {
        return Err(AppError::Fetch(format!("URL has no host: {}", url)));
    }

    Ok(())
}
