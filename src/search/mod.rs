//! Search aggregation across both sources.
//!
//! The aggregator is the one component that never fails: each source runs
//! behind its circuit breaker, source-level failures are demoted to advisory
//! `warn!` events, and whatever the other source returned still comes back to
//! the caller, deduplicated. A degraded upstream means fewer results, never
//! an error.

mod dedupe;

pub use dedupe::dedupe;

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::breaker::CircuitBreaker;
use crate::record::BookRecord;
use crate::source::{SearchRequest, SourceAdapter};

/// Per-source enable switches, as surfaced in the reader's settings screen.
#[derive(Debug, Clone, Copy)]
pub struct SourceToggles {
    /// Query the single-endpoint API source.
    pub api: bool,
    /// Query the multi-mirror catalog source.
    pub catalog: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            api: true,
            catalog: true,
        }
    }
}

/// One source adapter paired with its circuit breaker.
struct GatedSource {
    adapter: Arc<dyn SourceAdapter>,
    breaker: CircuitBreaker,
}

impl GatedSource {
    /// Runs one breaker-gated search; always returns a (possibly empty) list.
    async fn query(&self, enabled: bool, request: &SearchRequest) -> Vec<BookRecord> {
        let source = self.adapter.id();
        if !enabled {
            debug!(source = %source, "source disabled for this search");
            return Vec::new();
        }
        if !self.breaker.can_execute() {
            // Routing decision, not an error; the breaker will let a trial
            // call through once its reset timeout elapses.
            warn!(source = %source, "circuit open, source skipped");
            return Vec::new();
        }

        match self.adapter.search(request).await {
            Ok(records) => {
                self.breaker.record_success();
                records
            }
            Err(error) => {
                self.breaker.record_failure();
                warn!(source = %source, error = %error, "source failed, continuing with partial results");
                Vec::new()
            }
        }
    }
}

/// Orchestrates both sources and merges their results.
pub struct SearchAggregator {
    api: GatedSource,
    catalog: GatedSource,
}

impl SearchAggregator {
    /// Wires the two adapters to their breakers.
    #[must_use]
    pub fn new(
        api_adapter: Arc<dyn SourceAdapter>,
        api_breaker: CircuitBreaker,
        catalog_adapter: Arc<dyn SourceAdapter>,
        catalog_breaker: CircuitBreaker,
    ) -> Self {
        Self {
            api: GatedSource {
                adapter: api_adapter,
                breaker: api_breaker,
            },
            catalog: GatedSource {
                adapter: catalog_adapter,
                breaker: catalog_breaker,
            },
        }
    }

    /// Searches every enabled source concurrently and returns the merged,
    /// deduplicated result list. Never fails: source errors are advisory.
    ///
    /// The catalog source has no stable pagination contract, so it is only
    /// queried for the first page; later pages come from the api source alone.
    #[instrument(skip(self, request, toggles), fields(query = %request.query, page = request.page))]
    pub async fn search(
        &self,
        request: &SearchRequest,
        toggles: SourceToggles,
    ) -> Vec<BookRecord> {
        let query_catalog = toggles.catalog && request.page == 1;

        let (mut merged, catalog_records) = tokio::join!(
            self.api.query(toggles.api, request),
            self.catalog.query(query_catalog, request),
        );
        merged.extend(catalog_records);

        let deduped = dedupe(merged);
        debug!(results = deduped.len(), "search complete");
        deduped
    }
}
