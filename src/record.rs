//! Common book record shape produced by every source adapter.
//!
//! Both upstreams are normalized into [`BookRecord`] so the aggregator,
//! deduplicator, and resolver never need to know which wire format a record
//! came from. Records are created fresh per search response and treated as
//! immutable afterwards; the core never persists them (that is the library
//! collaborator's job after download).

use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

/// Identifies which upstream produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// The single-endpoint metadata API.
    Api,
    /// The multi-mirror HTML catalog.
    Catalog,
}

impl SourceId {
    /// Returns the short lowercase name used in logs and CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Catalog => "catalog",
        }
    }

    /// Dedup tie-break priority: lower wins when two records share a hash.
    #[must_use]
    pub(crate) fn dedup_rank(self) -> u8 {
        match self {
            Self::Api => 0,
            Self::Catalog => 1,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry returned by search, normalized across sources.
///
/// `content_hash` is the dedup key: either empty (unknown, treated as unique)
/// or exactly 32 lowercase hex characters, following the upstream catalog's
/// per-edition digest convention. Use [`normalize_content_hash`] when filling
/// it from untrusted upstream data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRecord {
    /// Book title, when the upstream supplied one.
    pub title: Option<String>,
    /// Author(s) as a single display string.
    pub author: Option<String>,
    /// Lowercase 32-hex dedup key, or empty for unknown/unique.
    pub content_hash: String,
    /// Cover image URL (api source only).
    pub cover_url: Option<String>,
    /// File size as reported upstream (string or numeric origin).
    pub file_size: Option<String>,
    /// Lowercase format extension, e.g. "pdf" or "epub".
    pub extension: String,
    /// Publisher, when the catalog row carried one.
    pub publisher: Option<String>,
    /// Publication year as reported upstream.
    pub year: Option<String>,
    /// Which upstream produced this record.
    pub source: SourceId,
    /// A page URL or direct URL usable for link resolution, source-dependent.
    pub download_hint: Option<String>,
    /// When this record was fetched.
    pub fetched_at: SystemTime,
}

impl BookRecord {
    /// Creates an empty record tagged with its source; adapters fill the rest.
    #[must_use]
    pub fn new(source: SourceId) -> Self {
        Self {
            title: None,
            author: None,
            content_hash: String::new(),
            cover_url: None,
            file_size: None,
            extension: String::new(),
            publisher: None,
            year: None,
            source,
            download_hint: None,
            fetched_at: SystemTime::now(),
        }
    }

    /// Title for display, falling back to a fixed placeholder.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// Normalizes an upstream hash value to the record convention.
///
/// Returns the lowercase hash when it is exactly 32 hex characters, and an
/// empty string (unknown/unique) for anything else.
#[must_use]
pub fn normalize_content_hash(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 32 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        trimmed.to_ascii_lowercase()
    } else {
        String::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_as_str() {
        assert_eq!(SourceId::Api.as_str(), "api");
        assert_eq!(SourceId::Catalog.as_str(), "catalog");
    }

    #[test]
    fn test_source_id_dedup_rank_prefers_api() {
        assert!(SourceId::Api.dedup_rank() < SourceId::Catalog.dedup_rank());
    }

    #[test]
    fn test_new_record_is_empty_except_source() {
        let record = BookRecord::new(SourceId::Catalog);
        assert_eq!(record.source, SourceId::Catalog);
        assert!(record.title.is_none());
        assert!(record.content_hash.is_empty());
        assert!(record.extension.is_empty());
        assert!(record.download_hint.is_none());
    }

    #[test]
    fn test_display_title_fallback() {
        let mut record = BookRecord::new(SourceId::Api);
        assert_eq!(record.display_title(), "(untitled)");
        record.title = Some("Dune".to_string());
        assert_eq!(record.display_title(), "Dune");
    }

    #[test]
    fn test_normalize_content_hash_valid_lowercased() {
        assert_eq!(
            normalize_content_hash("D41D8CD98F00B204E9800998ECF8427E"),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            normalize_content_hash("  d41d8cd98f00b204e9800998ecf8427e  "),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_normalize_content_hash_invalid_becomes_empty() {
        // Wrong length
        assert_eq!(normalize_content_hash("abc123"), "");
        // Non-hex characters
        assert_eq!(normalize_content_hash("z41d8cd98f00b204e9800998ecf8427e"), "");
        // Empty stays empty
        assert_eq!(normalize_content_hash(""), "");
    }
}
