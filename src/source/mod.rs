//! Upstream source adapters producing the common record shape.
//!
//! Two independent, unreliable upstreams feed the aggregator:
//! - [`ApiSource`] - a single-endpoint JSON metadata API
//! - [`CatalogSource`] - a multi-mirror HTML catalog with health-ranked failover
//!
//! Both implement [`SourceAdapter`] so the aggregator can treat them
//! uniformly behind their circuit breakers. Adapters fail with a typed
//! [`SourceError`]; deciding what to do about a failure (advisory demotion,
//! breaker bookkeeping) is the aggregator's job, not theirs.

mod api;
mod catalog;
mod page;

pub use api::ApiSource;
pub use catalog::CatalogSource;
pub use page::parse_catalog_page;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::DEFAULT_SEARCH_TIMEOUT;
use crate::record::{BookRecord, SourceId};

/// One page of search parameters, shared by every adapter.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query (title, author, ...).
    pub query: String,
    /// Acceptable format extensions, lowercase (empty = any).
    pub formats: Vec<String>,
    /// 1-based result page.
    pub page: u32,
    /// Deadline applied to each upstream call.
    pub timeout: Duration,
}

impl SearchRequest {
    /// Creates a first-page request with the default timeout and any format.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            formats: Vec::new(),
            page: 1,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }
}

/// Terminal failure of one source for one search.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream did not respond within the deadline.
    #[error("{source_id} source timed out after {timeout:?}")]
    Timeout {
        /// Which source timed out.
        source_id: SourceId,
        /// The deadline that was applied.
        timeout: Duration,
    },

    /// The upstream could not serve the search at all (transport failure,
    /// bad response, or every mirror exhausted).
    #[error("{source_id} source unavailable: {detail}")]
    Unavailable {
        /// Which source is unavailable.
        source_id: SourceId,
        /// What went wrong, e.g. "3 mirrors attempted, none returned results".
        detail: String,
    },
}

impl SourceError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(source_id: SourceId, timeout: Duration) -> Self {
        Self::Timeout { source_id, timeout }
    }

    /// Creates an unavailable error with a human-readable cause.
    #[must_use]
    pub fn unavailable(source_id: SourceId, detail: impl Into<String>) -> Self {
        Self::Unavailable {
            source_id,
            detail: detail.into(),
        }
    }
}

/// A searchable upstream producing [`BookRecord`]s.
///
/// Uses `async_trait` so the aggregator can hold `Arc<dyn SourceAdapter>`
/// (Rust 2024 native async traits are not object-safe).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter represents.
    fn id(&self) -> SourceId;

    /// Runs one search against the upstream.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Timeout`] when the deadline elapsed and
    /// [`SourceError::Unavailable`] for every other terminal failure.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<BookRecord>, SourceError>;
}
