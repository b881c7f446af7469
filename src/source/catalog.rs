//! Multi-mirror HTML catalog adapter.
//!
//! The catalog has no API; every mirror serves the same search page. Mirrors
//! fail independently, so each search ranks them by recorded health, skips
//! the ones cooling down, and walks the rest in order, accumulating parsed
//! rows. Once a healthy mirror has pushed the accumulated count to the
//! early-stop threshold the walk ends, which keeps a satisfied query from
//! hammering every mirror.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CATALOG_MIRRORS, EARLY_STOP_RESULT_COUNT, default_user_agent,
};
use crate::mirror::MirrorHealthTracker;
use crate::record::{BookRecord, SourceId};
use crate::retry::RetryExecutor;
use crate::source::page::parse_catalog_page;
use crate::source::{SearchRequest, SourceAdapter, SourceError};

/// Attempts per mirror; mirror failover is the real retry mechanism here.
const MIRROR_MAX_ATTEMPTS: u32 = 2;

/// Adapter for the multi-mirror catalog.
pub struct CatalogSource {
    client: Client,
    mirrors: Vec<String>,
    tracker: Arc<MirrorHealthTracker>,
    retry: RetryExecutor,
}

impl CatalogSource {
    /// Creates an adapter over the known production mirrors.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new(tracker: Arc<MirrorHealthTracker>) -> Self {
        Self::with_mirrors(
            tracker,
            DEFAULT_CATALOG_MIRRORS.iter().map(ToString::to_string).collect(),
        )
    }

    /// Creates an adapter over a custom mirror list (for tests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_mirrors(tracker: Arc<MirrorHealthTracker>, mirrors: Vec<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            mirrors,
            tracker,
            retry: RetryExecutor::new(),
        }
    }

    /// The configured mirror list, in configured order.
    #[must_use]
    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// One search attempt against one mirror.
    async fn search_mirror(
        &self,
        mirror: &str,
        request: &SearchRequest,
    ) -> Result<Vec<BookRecord>, SourceError> {
        let url = format!("{}/search.php", mirror.trim_end_matches('/'));
        let page = request.page.to_string();
        let send = self
            .client
            .get(&url)
            .query(&[("req", request.query.as_str()), ("page", page.as_str())])
            .send();

        let response = tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| SourceError::timeout(SourceId::Catalog, request.timeout))?
            .map_err(|e| SourceError::unavailable(SourceId::Catalog, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::unavailable(
                SourceId::Catalog,
                format!("{mirror} returned HTTP {}", status.as_u16()),
            ));
        }

        let html = tokio::time::timeout(request.timeout, response.text())
            .await
            .map_err(|_| SourceError::timeout(SourceId::Catalog, request.timeout))?
            .map_err(|e| SourceError::unavailable(SourceId::Catalog, e.to_string()))?;

        let mut records = parse_catalog_page(&html, mirror);
        if !request.formats.is_empty() {
            records.retain(|r| request.formats.iter().any(|f| f.eq_ignore_ascii_case(&r.extension)));
        }
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for CatalogSource {
    fn id(&self) -> SourceId {
        SourceId::Catalog
    }

    #[instrument(skip(self, request), fields(source = "catalog", query = %request.query))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<BookRecord>, SourceError> {
        let ranked = self.tracker.rank_by_health(&self.mirrors);
        let mut attempted = 0u32;
        let mut results: Vec<BookRecord> = Vec::new();

        for mirror in &ranked {
            if !self.tracker.should_try(mirror) {
                debug!(mirror, "mirror cooling down, skipped");
                continue;
            }

            attempted += 1;
            let started = Instant::now();
            let this = self;
            let mirror_str = mirror.as_str();
            let outcome = self
                .retry
                .execute(
                    move || this.search_mirror(mirror_str, request),
                    "catalog mirror search",
                    MIRROR_MAX_ATTEMPTS,
                )
                .await;

            match outcome {
                Ok(records) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.tracker.record_success(mirror, elapsed_ms);
                    debug!(mirror, results = records.len(), elapsed_ms, "mirror answered");
                    results.extend(records);
                    // A healthy mirror just satisfied the query; stop fanning out.
                    if results.len() >= EARLY_STOP_RESULT_COUNT {
                        break;
                    }
                }
                Err(error) => {
                    self.tracker.record_failure(mirror);
                    warn!(mirror, error = %error, "mirror search failed");
                }
            }
        }

        if attempted == 0 {
            return Err(SourceError::unavailable(
                SourceId::Catalog,
                "no mirrors eligible (all cooling down)",
            ));
        }
        if results.is_empty() {
            return Err(SourceError::unavailable(
                SourceId::Catalog,
                format!("{attempted} mirrors attempted, none returned results"),
            ));
        }
        Ok(results)
    }
}
