//! Download-link resolution.
//!
//! A [`BookRecord`] rarely carries a directly fetchable URL. For catalog
//! records the resolver walks a fallback chain, stopping at the first
//! strategy that yields at least one URL:
//!
//! 1. the record's download hint already sits on a direct-download host
//! 2. fetch the hinted catalog page and scan its anchors ([`page_scan`])
//! 3. ask the external link-extraction helper about the same page URL
//! 4. synthesize the canonical fallback URL from the content hash
//! 5. hand back the original hint verbatim as a last resort
//!
//! Api records skip the chain: the api exposes a links endpoint returning
//! pre-vetted URLs, which only need placeholder filtering.

mod page_scan;

pub use page_scan::{on_direct_host, scan_download_page};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::constants::{
    CONNECT_TIMEOUT_SECS, DIRECT_DOWNLOAD_HOSTS, FALLBACK_URL_TEMPLATE, LINK_HELPER_TIMEOUT,
    default_user_agent,
};
use crate::record::{BookRecord, SourceId};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryExecutor};
use crate::source::ApiSource;

/// Substrings marking a link as a template/sample rather than a real URL.
const PLACEHOLDER_MARKERS: [&str; 4] = ["placeholder", "example.com", "{", "}"];

/// Errors from link resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every strategy (including the last resort) came up empty.
    #[error("no download links found for {title}")]
    NoLinksFound {
        /// Display title of the record, for the user-facing message.
        title: String,
    },

    /// A required network call failed after retries.
    #[error("link request failed for {context}: {detail}")]
    RequestFailed {
        /// What was being fetched (page URL or content hash).
        context: String,
        /// Underlying cause.
        detail: String,
    },
}

impl ResolveError {
    /// Creates a no-links error for a record.
    #[must_use]
    pub fn no_links(record: &BookRecord) -> Self {
        Self::NoLinksFound {
            title: record.display_title().to_string(),
        }
    }

    /// Creates a request failure with context.
    #[must_use]
    pub fn request_failed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RequestFailed {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

/// External link-extraction helper, keyed by a catalog page URL.
///
/// The production implementation calls an HTTP helper service; tests inject
/// stubs. Helper failures are soft: the resolver falls through to the next
/// strategy.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    /// Extracts candidate URLs for the given page.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::RequestFailed`] when the helper is unreachable
    /// or answers with an unusable body.
    async fn extract(&self, page_url: &str) -> Result<Vec<String>, ResolveError>;
}

/// HTTP implementation of [`LinkExtractor`].
///
/// Calls `GET {endpoint}?url={page_url}` with a short deadline and accepts
/// string, list, or key-value JSON shapes, flattening them to URLs.
#[derive(Debug, Clone)]
pub struct HttpLinkExtractor {
    client: Client,
    endpoint: String,
}

impl HttpLinkExtractor {
    /// Creates an extractor against a helper endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LinkExtractor for HttpLinkExtractor {
    async fn extract(&self, page_url: &str) -> Result<Vec<String>, ResolveError> {
        let send = self
            .client
            .get(&self.endpoint)
            .query(&[("url", page_url)])
            .send();
        let response = tokio::time::timeout(LINK_HELPER_TIMEOUT, send)
            .await
            .map_err(|_| ResolveError::request_failed(page_url, "helper timed out"))?
            .map_err(|e| ResolveError::request_failed(page_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::request_failed(
                page_url,
                format!("helper returned HTTP {}", response.status().as_u16()),
            ));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ResolveError::request_failed(page_url, e.to_string()))?;
        Ok(flatten_helper_value(&value))
    }
}

/// Flattens the helper's string / list / map shapes into URL strings.
fn flatten_helper_value(value: &serde_json::Value) -> Vec<String> {
    let candidates: Vec<String> = match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        serde_json::Value::Object(map) => map
            .values()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => Vec::new(),
    };
    candidates
        .into_iter()
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .collect()
}

/// Returns true if a link carries an obvious placeholder marker.
fn is_placeholder_link(link: &str) -> bool {
    let lower = link.to_ascii_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Resolves a book record to one or more fetchable URLs.
pub struct LinkResolver {
    client: Client,
    api: Arc<ApiSource>,
    direct_hosts: Vec<String>,
    catalog_hosts: Vec<String>,
    fallback_template: String,
    extractor: Option<Arc<dyn LinkExtractor>>,
    retry: RetryExecutor,
}

impl LinkResolver {
    /// Creates a resolver with the production host lists and no helper.
    /// Catalog hosts are derived from the configured mirror URLs.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    pub fn new(api: Arc<ApiSource>, catalog_mirrors: &[String]) -> Self {
        Self::with_hosts(
            api,
            DIRECT_DOWNLOAD_HOSTS.iter().map(ToString::to_string).collect(),
            catalog_mirrors
                .iter()
                .filter_map(|m| Url::parse(m).ok())
                .filter_map(|u| u.host_str().map(ToString::to_string))
                .collect(),
            FALLBACK_URL_TEMPLATE,
        )
    }

    /// Creates a resolver with explicit host lists (for tests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_hosts(
        api: Arc<ApiSource>,
        direct_hosts: Vec<String>,
        catalog_hosts: Vec<String>,
        fallback_template: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            api,
            direct_hosts,
            catalog_hosts,
            fallback_template: fallback_template.into(),
            extractor: None,
            retry: RetryExecutor::new(),
        }
    }

    /// Attaches an external link-extraction helper (strategy 3).
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn LinkExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Resolves a record to fetchable URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoLinksFound`] when the chain is exhausted and
    /// [`ResolveError::RequestFailed`] when the api links call fails outright.
    #[instrument(skip(self, record), fields(source = %record.source, title = record.display_title()))]
    pub async fn resolve(&self, record: &BookRecord) -> Result<Vec<String>, ResolveError> {
        match record.source {
            SourceId::Api => self.resolve_api(record).await,
            SourceId::Catalog => self.resolve_catalog(record).await,
        }
    }

    /// Api records: one retried links call, placeholder-filtered.
    async fn resolve_api(&self, record: &BookRecord) -> Result<Vec<String>, ResolveError> {
        // Without a hash there is nothing to ask the links endpoint for;
        // a non-placeholder hint is still usable directly.
        if record.content_hash.is_empty() {
            return match &record.download_hint {
                Some(hint) if !is_placeholder_link(hint) => Ok(vec![hint.clone()]),
                _ => Err(ResolveError::no_links(record)),
            };
        }

        let api = &*self.api;
        let hash = record.content_hash.as_str();
        let links = self
            .retry
            .execute(
                move || api.download_links(hash),
                "api link resolution",
                DEFAULT_MAX_ATTEMPTS,
            )
            .await
            .map_err(|e| ResolveError::request_failed(&record.content_hash, e.to_string()))?;

        let vetted: Vec<String> = links
            .into_iter()
            .filter(|link| !is_placeholder_link(link))
            .collect();
        if vetted.is_empty() {
            return Err(ResolveError::no_links(record));
        }
        Ok(vetted)
    }

    /// Catalog records: the five-step fallback chain.
    async fn resolve_catalog(&self, record: &BookRecord) -> Result<Vec<String>, ResolveError> {
        let hint = record.download_hint.as_deref().unwrap_or("");

        // 1. Hint is already a direct link: no network needed.
        if !hint.is_empty() && on_direct_host(hint, &self.direct_hosts) {
            debug!("download hint already direct");
            return Ok(vec![hint.to_string()]);
        }

        // 2. Hint points into the catalog: fetch and scan the page.
        if !hint.is_empty() && self.on_catalog_host(hint) {
            match self.fetch_page(hint).await {
                Ok(html) => {
                    let links = scan_download_page(&html, hint, &self.direct_hosts);
                    if !links.is_empty() {
                        debug!(links = links.len(), "links found by page scan");
                        return Ok(links);
                    }
                }
                Err(error) => {
                    warn!(page = hint, error = %error, "download page fetch failed, falling through");
                }
            }

            // 3. Same page URL through the external helper, best effort.
            if let Some(extractor) = &self.extractor {
                match extractor.extract(hint).await {
                    Ok(links) if !links.is_empty() => {
                        debug!(links = links.len(), "links found by helper");
                        return Ok(links);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(page = hint, error = %error, "link helper failed, falling through");
                    }
                }
            }
        }

        // 4. Synthesize the canonical URL from the content hash.
        if !record.content_hash.is_empty() {
            let url = self
                .fallback_template
                .replace("{hash}", &record.content_hash);
            debug!("falling back to canonical hash URL");
            return Ok(vec![url]);
        }

        // 5. Last resort: the original hint, verbatim.
        if !hint.is_empty() {
            return Ok(vec![hint.to_string()]);
        }

        Err(ResolveError::no_links(record))
    }

    fn on_catalog_host(&self, url: &str) -> bool {
        on_direct_host(url, &self.catalog_hosts)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ResolveError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::request_failed(url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ResolveError::request_failed(
                url,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| ResolveError::request_failed(url, e.to_string()))
    }
}
