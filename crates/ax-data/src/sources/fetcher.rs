//! Retrieval of source file bytes

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use ahash::AHashMap;
use parking_lot::RwLock;

use super::SourceLocator;
use crate::cache::SourceCache;
use crate::{DataError, Result};

/// Trait for anything that can produce the bytes of a source file
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>>;
}

/// Reads path locators from the local filesystem
#[derive(Debug, Default, Clone)]
pub struct FsFetcher;

#[async_trait]
impl SourceFetcher for FsFetcher {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>> {
        match locator {
            SourceLocator::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| DataError::fetch(locator, e)),
            SourceLocator::Url(_) => Err(DataError::fetch(locator, "not a filesystem path")),
        }
    }
}

/// Downloads URL locators
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>> {
        let url = match locator {
            SourceLocator::Url(url) => url,
            SourceLocator::Path(_) => return Err(DataError::fetch(locator, "not a URL")),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::fetch(locator, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::fetch(locator, format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| DataError::fetch(locator, e))?;
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Dispatches on the locator kind, optionally through a byte cache
pub struct DefaultFetcher {
    fs: FsFetcher,
    http: HttpFetcher,
    cache: Option<Arc<SourceCache>>,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            fs: FsFetcher,
            http: HttpFetcher::new(timeout)?,
            cache: None,
        })
    }

    /// Serve repeated fetches of the same locator from `cache`
    pub fn with_cache(mut self, cache: Arc<SourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.as_ref().and_then(|c| c.get(locator)) {
            tracing::debug!("Serving {} from cache", locator);
            return Ok(bytes.as_ref().clone());
        }

        let bytes = match locator {
            SourceLocator::Url(_) => self.http.fetch(locator).await?,
            SourceLocator::Path(_) => self.fs.fetch(locator).await?,
        };

        if let Some(cache) = &self.cache {
            cache.put(locator.clone(), Arc::new(bytes.clone()));
        }
        Ok(bytes)
    }
}

/// In-memory files keyed by locator, for demos and tests
#[derive(Default)]
pub struct MemoryFetcher {
    files: RwLock<AHashMap<SourceLocator, Arc<Vec<u8>>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: SourceLocator, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(locator, Arc::new(bytes.into()));
    }

    pub fn remove(&self, locator: &SourceLocator) {
        self.files.write().remove(locator);
    }
}

#[async_trait]
impl SourceFetcher for MemoryFetcher {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(locator)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| DataError::fetch(locator, "HTTP 404 Not Found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher_reports_missing_files() {
        let fetcher = MemoryFetcher::new();
        let locator = SourceLocator::parse("https://example.org/facts.arrow");
        fetcher.insert(locator.clone(), b"abc".to_vec());

        assert_eq!(fetcher.fetch(&locator).await.unwrap(), b"abc");

        fetcher.remove(&locator);
        let err = fetcher.fetch(&locator).await.unwrap_err();
        assert!(matches!(err, DataError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_fs_fetcher_missing_path_is_fetch_failure() {
        let locator = SourceLocator::parse("/definitely/not/here/facts.arrow");
        let err = FsFetcher.fetch(&locator).await.unwrap_err();
        assert!(err.to_string().contains("facts.arrow"));
    }
}
