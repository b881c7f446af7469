//! Single-endpoint metadata API adapter.
//!
//! One JSON endpoint, one retried call per search. The per-request deadline
//! is enforced with `tokio::time::timeout` so a hung upstream surfaces as
//! [`SourceError::Timeout`] distinctly from transport failures, letting the
//! aggregator report a specific cause.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_API_BASE_URL, default_user_agent};
use crate::record::{BookRecord, SourceId, normalize_content_hash};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryExecutor, RetryExhausted};
use crate::source::{SearchRequest, SourceAdapter, SourceError};

use async_trait::async_trait;

/// Adapter for the single-endpoint metadata API.
#[derive(Debug, Clone)]
pub struct ApiSource {
    client: Client,
    base_url: String,
    retry: RetryExecutor,
}

/// Wire shape of one search response.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    books: Vec<ApiBook>,
}

/// Wire shape of one book entry. Numeric fields arrive as either strings or
/// numbers depending on upstream version, hence `serde_json::Value`.
#[derive(Debug, Deserialize)]
struct ApiBook {
    title: Option<String>,
    author: Option<String>,
    md5: Option<String>,
    cover: Option<String>,
    size: Option<serde_json::Value>,
    extension: Option<String>,
    publisher: Option<String>,
    year: Option<serde_json::Value>,
    download_url: Option<String>,
}

/// Wire shape of the download-links response.
#[derive(Debug, Deserialize)]
struct LinksResponse {
    #[serde(default)]
    links: Vec<String>,
}

impl ApiSource {
    /// Creates an adapter against the production endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_BASE_URL)
    }

    /// Creates an adapter against a custom base URL (for tests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryExecutor::new(),
        }
    }

    /// One search attempt; the caller wraps this in the retry executor.
    async fn search_once(&self, request: &SearchRequest) -> Result<Vec<BookRecord>, SourceError> {
        let url = format!("{}/v1/search", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("q", request.query.clone()),
            ("page", request.page.to_string()),
        ];
        if !request.formats.is_empty() {
            query.push(("ext", request.formats.join(",")));
        }

        let send = self.client.get(&url).query(&query).send();
        let response = tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| SourceError::timeout(SourceId::Api, request.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::timeout(SourceId::Api, request.timeout)
                } else {
                    SourceError::unavailable(SourceId::Api, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::unavailable(
                SourceId::Api,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body: SearchResponse = tokio::time::timeout(request.timeout, response.json())
            .await
            .map_err(|_| SourceError::timeout(SourceId::Api, request.timeout))?
            .map_err(|e| {
                SourceError::unavailable(SourceId::Api, format!("bad response body: {e}"))
            })?;

        Ok(body.books.into_iter().map(into_record).collect())
    }

    /// Fetches pre-vetted download links for a content hash.
    ///
    /// Links are returned raw; the resolver filters out placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] on transport or decode failure.
    #[instrument(skip(self))]
    pub async fn download_links(&self, content_hash: &str) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/v1/links", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("md5", content_hash)])
            .send()
            .await
            .map_err(|e| SourceError::unavailable(SourceId::Api, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::unavailable(
                SourceId::Api,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body: LinksResponse = response
            .json()
            .await
            .map_err(|e| SourceError::unavailable(SourceId::Api, format!("bad response body: {e}")))?;
        Ok(body.links)
    }
}

impl Default for ApiSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ApiSource {
    fn id(&self) -> SourceId {
        SourceId::Api
    }

    #[instrument(skip(self, request), fields(source = "api", query = %request.query, page = request.page))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<BookRecord>, SourceError> {
        let this = self;
        let records = self
            .retry
            .execute(
                move || this.search_once(request),
                "api search",
                DEFAULT_MAX_ATTEMPTS,
            )
            .await
            .map_err(flatten_retry)?;
        debug!(results = records.len(), "api search complete");
        Ok(records)
    }
}

/// Collapses retry exhaustion back into the adapter's error contract,
/// keeping the timeout/unavailable distinction of the last attempt.
fn flatten_retry(exhausted: RetryExhausted<SourceError>) -> SourceError {
    match exhausted.source {
        timeout @ SourceError::Timeout { .. } => timeout,
        SourceError::Unavailable { source_id, detail } => SourceError::Unavailable {
            source_id,
            detail: format!("{detail} (after {} attempts)", exhausted.attempts),
        },
    }
}

fn into_record(book: ApiBook) -> BookRecord {
    let mut record = BookRecord::new(SourceId::Api);
    record.title = book.title.filter(|t| !t.trim().is_empty());
    record.author = book.author.filter(|a| !a.trim().is_empty());
    record.content_hash = book
        .md5
        .as_deref()
        .map(normalize_content_hash)
        .unwrap_or_default();
    record.cover_url = book.cover.filter(|c| !c.is_empty());
    record.file_size = book.size.as_ref().map(value_to_string);
    record.extension = book
        .extension
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();
    record.publisher = book.publisher.filter(|p| !p.trim().is_empty());
    record.year = book.year.as_ref().map(value_to_string).filter(|y| !y.is_empty());
    record.download_hint = book.download_url.filter(|u| !u.is_empty());
    record
}

/// Renders a JSON string or number field as a plain string.
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api_book(json: serde_json::Value) -> ApiBook {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_into_record_full_entry() {
        let book = api_book(serde_json::json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "md5": "D41D8CD98F00B204E9800998ECF8427E",
            "cover": "https://covers.test/dune.jpg",
            "size": 2048576,
            "extension": "EPUB",
            "publisher": "Chilton",
            "year": "1965",
            "download_url": "https://files.bookvault.io/d41d8cd98f00b204e9800998ecf8427e"
        }));
        let record = into_record(book);
        assert_eq!(record.source, SourceId::Api);
        assert_eq!(record.title.as_deref(), Some("Dune"));
        assert_eq!(record.content_hash, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(record.file_size.as_deref(), Some("2048576"));
        assert_eq!(record.extension, "epub");
        assert_eq!(record.year.as_deref(), Some("1965"));
        assert!(record.download_hint.is_some());
    }

    #[test]
    fn test_into_record_numeric_year_and_missing_fields() {
        let book = api_book(serde_json::json!({ "year": 1999, "extension": null }));
        let record = into_record(book);
        assert_eq!(record.year.as_deref(), Some("1999"));
        assert!(record.title.is_none());
        assert!(record.extension.is_empty());
        assert!(record.content_hash.is_empty());
    }

    #[test]
    fn test_into_record_invalid_hash_dropped() {
        let book = api_book(serde_json::json!({ "md5": "not-a-hash" }));
        assert!(into_record(book).content_hash.is_empty());
    }

    #[test]
    fn test_flatten_retry_preserves_timeout_kind() {
        let exhausted = RetryExhausted {
            operation: "api search".to_string(),
            attempts: 3,
            source: SourceError::timeout(SourceId::Api, Duration::from_secs(15)),
        };
        assert!(matches!(
            flatten_retry(exhausted),
            SourceError::Timeout { .. }
        ));
    }

    #[test]
    fn test_flatten_retry_annotates_attempts() {
        let exhausted = RetryExhausted {
            operation: "api search".to_string(),
            attempts: 3,
            source: SourceError::unavailable(SourceId::Api, "HTTP 503"),
        };
        let error = flatten_retry(exhausted);
        assert!(error.to_string().contains("after 3 attempts"));
    }
}
