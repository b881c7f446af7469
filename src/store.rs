//! The book-store facade consumed by the surrounding application.
//!
//! [`BookStore`] owns the process-lifetime services (circuit breakers, mirror
//! health tracker, HTTP clients) and exposes the five public operations:
//! search, link resolution, download, the mirror health snapshot, and the
//! mirror health reset. Everything is injected and lock-guarded; there are no
//! globals, so multiple stores can coexist in tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_CATALOG_MIRRORS, DEFAULT_DOWNLOAD_TIMEOUT,
    DEFAULT_SEARCH_TIMEOUT,
};
use crate::download::{CancelToken, DownloadError, Downloader, ProgressFn, sanitize_filename};
use crate::mirror::{MirrorHealthTracker, MirrorSnapshot};
use crate::record::BookRecord;
use crate::resolver::{LinkResolver, ResolveError};
use crate::search::{SearchAggregator, SourceToggles};
use crate::source::{ApiSource, CatalogSource, SearchRequest};

/// Construction-time settings for a [`BookStore`].
#[derive(Debug, Clone)]
pub struct BookStoreConfig {
    /// Base URL of the single-endpoint metadata API.
    pub api_base_url: String,
    /// Ordered mirror base URLs for the catalog source.
    pub catalog_mirrors: Vec<String>,
    /// Directory downloads land in.
    pub download_dir: PathBuf,
    /// Deadline applied to each source per search.
    pub search_timeout: Duration,
    /// Deadline applied to each download attempt.
    pub download_timeout: Duration,
}

impl Default for BookStoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            catalog_mirrors: DEFAULT_CATALOG_MIRRORS
                .iter()
                .map(ToString::to_string)
                .collect(),
            download_dir: PathBuf::from("downloads"),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// The aggregation client: both sources behind their breakers, the link
/// resolver, and the resumable downloader, wired together.
pub struct BookStore {
    aggregator: SearchAggregator,
    resolver: LinkResolver,
    downloader: Downloader,
    tracker: Arc<MirrorHealthTracker>,
    config: BookStoreConfig,
}

impl BookStore {
    /// Creates a store against the production endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BookStoreConfig::default())
    }

    /// Creates a store from explicit settings.
    #[must_use]
    pub fn with_config(config: BookStoreConfig) -> Self {
        let tracker = Arc::new(MirrorHealthTracker::with_mirrors(
            config.catalog_mirrors.iter().cloned(),
        ));
        let api = Arc::new(ApiSource::with_base_url(&config.api_base_url));
        let catalog = Arc::new(CatalogSource::with_mirrors(
            Arc::clone(&tracker),
            config.catalog_mirrors.clone(),
        ));
        let resolver = LinkResolver::new(Arc::clone(&api), &config.catalog_mirrors);
        let aggregator = SearchAggregator::new(
            api,
            CircuitBreaker::new("api", BreakerConfig::api()),
            catalog,
            CircuitBreaker::new("catalog", BreakerConfig::catalog()),
        );

        Self {
            aggregator,
            resolver,
            downloader: Downloader::new(),
            tracker,
            config,
        }
    }

    /// Searches both enabled sources; never fails. A degraded source means
    /// fewer results, not an error.
    pub async fn search(
        &self,
        query: &str,
        formats: &[String],
        page: u32,
        toggles: SourceToggles,
        timeout: Option<Duration>,
    ) -> Vec<BookRecord> {
        let request = SearchRequest {
            query: query.to_string(),
            formats: formats.iter().map(|f| f.to_ascii_lowercase()).collect(),
            page: page.max(1),
            timeout: timeout.unwrap_or(self.config.search_timeout),
        };
        self.aggregator.search(&request, toggles).await
    }

    /// Resolves a record into fetchable download URLs.
    ///
    /// # Errors
    ///
    /// Propagates [`ResolveError`] when the strategy chain is exhausted or a
    /// required call failed.
    pub async fn resolve_download_links(
        &self,
        record: &BookRecord,
    ) -> Result<Vec<String>, ResolveError> {
        self.resolver.resolve(record).await
    }

    /// Downloads a URL into the configured download directory, resuming any
    /// existing partial file. `Ok(None)` means the caller cancelled.
    ///
    /// # Errors
    ///
    /// Propagates [`DownloadError`] from the final attempt.
    pub async fn download(
        &self,
        url: &str,
        file_name: &str,
        on_progress: Option<&ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<Option<PathBuf>, DownloadError> {
        let dest = self.config.download_dir.join(sanitize_filename(file_name));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }
        self.downloader
            .download(url, &dest, on_progress, self.config.download_timeout, cancel)
            .await
    }

    /// Read-only diagnostic view of every catalog mirror.
    #[must_use]
    pub fn mirror_health_snapshot(&self) -> Vec<MirrorSnapshot> {
        self.tracker.snapshot()
    }

    /// Operational override: clears all mirror failure history.
    pub fn reset_mirror_health(&self) {
        self.tracker.reset();
    }
}

impl Default for BookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_known_endpoints() {
        let config = BookStoreConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.catalog_mirrors.len(), DEFAULT_CATALOG_MIRRORS.len());
    }

    #[test]
    fn test_store_snapshot_covers_configured_mirrors() {
        let store = BookStore::new();
        let snapshot = store.mirror_health_snapshot();
        assert_eq!(snapshot.len(), DEFAULT_CATALOG_MIRRORS.len());
        assert!(snapshot.iter().all(|m| m.healthy));
    }

    #[test]
    fn test_reset_is_idempotent_on_fresh_store() {
        let store = BookStore::new();
        store.reset_mirror_health();
        assert!(store.mirror_health_snapshot().iter().all(|m| m.healthy));
    }
}
