//! Shared constants: upstream endpoints, timeouts, and the User-Agent format.

use std::time::Duration;

/// Default base URL for the single-endpoint metadata API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.bookvault.io";

/// Known mirror base URLs for the multi-mirror catalog, in configured order.
pub const DEFAULT_CATALOG_MIRRORS: [&str; 3] = [
    "https://bookcat.is",
    "https://bookcat.rs",
    "https://bookcat.st",
];

/// Hosts that serve files directly; links on these hosts need no resolution.
pub const DIRECT_DOWNLOAD_HOSTS: [&str; 3] =
    ["dl.bookcat.is", "files.bookvault.io", "download.bookcat.is"];

/// Canonical fallback download URL, keyed by content hash.
pub const FALLBACK_URL_TEMPLATE: &str = "https://dl.bookcat.is/main/{hash}";

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default per-search deadline applied to each source.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default deadline for a whole download attempt.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Deadline for the external link-extraction helper (kept short; it is a
/// best-effort fallback, not a primary strategy).
pub const LINK_HELPER_TIMEOUT: Duration = Duration::from_secs(3);

/// A mirror search stops fanning out once this many results have accumulated
/// and the most recent mirror answered while healthy.
pub const EARLY_STOP_RESULT_COUNT: usize = 10;

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/bookstore";

/// Default User-Agent for all HTTP traffic (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bookstore/{version} (personal-ereader; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_version_and_project_url() {
        let ua = default_user_agent();
        assert!(ua.starts_with("bookstore/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
        assert!(ua.contains(PROJECT_UA_URL));
    }

    #[test]
    fn test_fallback_template_has_hash_slot() {
        assert!(FALLBACK_URL_TEMPLATE.contains("{hash}"));
    }
}
