//! Anchor scanning for catalog download pages.
//!
//! A catalog download page links to the actual file through a handful of
//! markup shapes that vary by mirror. [`scan_download_page`] tries selector
//! tiers in priority order and returns every match from the first tier that
//! produces any:
//!
//! 1. anchors pointing at a known direct-download host
//! 2. anchors whose visible text says "download" or "GET"
//! 3. anchors whose href goes through `download.php` / `get.php`
//!
//! Pure function over the HTML, unit-testable without network I/O and easy to
//! swap when the upstream markup changes.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<[^>]*>").unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

/// One parsed anchor: absolutized href plus visible text.
struct Anchor {
    url: String,
    text: String,
}

/// Scans a download page for file links, tier by tier.
#[must_use]
pub fn scan_download_page(html: &str, base_url: &str, direct_hosts: &[String]) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let anchors: Vec<Anchor> = ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str().replace("&amp;", "&");
            let url = absolutize(&href, base.as_ref())?;
            let text = TAG_RE
                .replace_all(caps.get(2)?.as_str(), " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            Some(Anchor { url, text })
        })
        .collect();

    let tiers: [&dyn Fn(&Anchor) -> bool; 3] = [
        &|a| on_direct_host(&a.url, direct_hosts),
        &|a| has_download_text(&a.text),
        &|a| {
            let lower = a.url.to_ascii_lowercase();
            lower.contains("download.php") || lower.contains("get.php")
        },
    ];

    for tier in tiers {
        let matches = dedup_preserving_order(
            anchors.iter().filter(|a| tier(a)).map(|a| a.url.clone()),
        );
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

/// Returns true if the URL's host is one of the known direct-download hosts.
#[must_use]
pub fn on_direct_host(url: &str, direct_hosts: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    direct_hosts
        .iter()
        .any(|known| host == known.trim_start_matches("www.").to_ascii_lowercase())
}

/// Returns true for link text like "Download", "download now", or a bare "GET".
fn has_download_text(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("download") || lower.split_whitespace().any(|word| word == "get")
}

fn absolutize(href: &str, base: Option<&Url>) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

fn dedup_preserving_order(urls: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.filter(|u| seen.insert(u.clone())).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BASE: &str = "https://bookcat.is/book/123";

    fn hosts() -> Vec<String> {
        vec!["dl.bookcat.is".to_string(), "files.bookvault.io".to_string()]
    }

    #[test]
    fn test_direct_host_tier_wins_over_everything() {
        let html = r#"
            <a href="https://dl.bookcat.is/main/abc.pdf">mirror 1</a>
            <a href="/get.php?id=1">Download</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links, vec!["https://dl.bookcat.is/main/abc.pdf".to_string()]);
    }

    #[test]
    fn test_download_text_tier() {
        let html = r#"
            <a href="/fetch?id=9"><b>Download</b> now</a>
            <a href="/other">something else</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links, vec!["https://bookcat.is/fetch?id=9".to_string()]);
    }

    #[test]
    fn test_bare_get_text_matches_whole_word_only() {
        let html = r#"
            <a href="/a">GET</a>
            <a href="/b">Forget me</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links, vec!["https://bookcat.is/a".to_string()]);
    }

    #[test]
    fn test_php_href_tier_as_last_resort() {
        let html = r#"
            <a href="https://other.test/download.php?md5=abc">[1]</a>
            <a href="/ads">sponsor</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links, vec!["https://other.test/download.php?md5=abc".to_string()]);
    }

    #[test]
    fn test_all_matches_of_winning_tier_returned() {
        let html = r#"
            <a href="https://dl.bookcat.is/main/abc.pdf">m1</a>
            <a href="https://files.bookvault.io/abc">m2</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_duplicate_urls_collapsed() {
        let html = r#"
            <a href="https://dl.bookcat.is/x">a</a>
            <a href="https://dl.bookcat.is/x">b</a>
        "#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_no_anchors_yields_empty() {
        assert!(scan_download_page("<p>nothing here</p>", BASE, &hosts()).is_empty());
    }

    #[test]
    fn test_on_direct_host_ignores_www_and_case() {
        let hosts = vec!["dl.bookcat.is".to_string()];
        assert!(on_direct_host("https://WWW.DL.bookcat.IS/file", &hosts));
        assert!(!on_direct_host("https://dl.bookcat.is.evil.test/file", &hosts));
        assert!(!on_direct_host("not a url", &hosts));
    }

    #[test]
    fn test_entity_encoded_ampersands_decoded() {
        let html = r#"<a href="/get.php?a=1&amp;b=2">Download</a>"#;
        let links = scan_download_page(html, BASE, &hosts());
        assert_eq!(links, vec!["https://bookcat.is/get.php?a=1&b=2".to_string()]);
    }
}
