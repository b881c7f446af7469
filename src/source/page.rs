//! Catalog result-page scraping, isolated from network I/O.
//!
//! The mirror catalog serves search results as an HTML table. Markup differs
//! slightly between mirrors and changes over time, so everything fragile
//! lives behind [`parse_catalog_page`]: locate the result table, skip header
//! rows, and pull one [`BookRecord`] per data row. Rows that cannot be parsed
//! are skipped individually; a malformed row never aborts the whole page.
//!
//! Expected row layout (columns may trail off on some mirrors):
//! `id | author | title | publisher | year | size | extension | mirror links`
//! The content hash rides in an `md5=` query parameter of the title link, and
//! the raw download-page reference is the first link in the mirrors column.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::record::{BookRecord, SourceId, normalize_content_hash};

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<table[^>]*>(.*?)</table>"));

static RESULTS_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<table[^>]*class\s*=\s*["'](?:[^"']*\s)?(?:c|results|catalog)(?:\s[^"']*)?["'][^>]*>(.*?)</table>"#,
    )
});

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<tr[^>]*>(.*?)</tr>"));

static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<td[^>]*>(.*?)</td>"));

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?is)href\s*=\s*["']([^"']+)["']"#));

static HASH_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)md5=([0-9a-f]{32})"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));

/// Parses one catalog search-result page into records tagged
/// [`SourceId::Catalog`]. `base_url` absolutizes relative hrefs.
///
/// Returns an empty vec when no result table is found.
#[must_use]
pub fn parse_catalog_page(html: &str, base_url: &str) -> Vec<BookRecord> {
    let Some(table) = locate_result_table(html) else {
        debug!("no result table found in catalog page");
        return Vec::new();
    };

    let base = Url::parse(base_url).ok();
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in ROW_RE.captures_iter(table) {
        let row_html = match row.get(1) {
            Some(m) => m.as_str(),
            None => continue,
        };
        if is_header_row(row_html) {
            continue;
        }
        match parse_row(row_html, base.as_ref()) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, kept = records.len(), "skipped malformed catalog rows");
    }
    records
}

/// Finds the result table body: a table whose class marks it as the result
/// listing, falling back to the table with the most rows.
fn locate_result_table(html: &str) -> Option<&str> {
    if let Some(caps) = RESULTS_TABLE_RE.captures(html) {
        return caps.get(1).map(|m| m.as_str());
    }
    TABLE_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .max_by_key(|body| ROW_RE.find_iter(body).count())
}

fn is_header_row(row_html: &str) -> bool {
    row_html.contains("<th") || CELL_RE.find_iter(row_html).count() == 0
}

/// Parses one data row; `None` means the row was malformed or empty enough
/// to discard (no title and no extension).
fn parse_row(row_html: &str, base: Option<&Url>) -> Option<BookRecord> {
    let cells: Vec<&str> = CELL_RE
        .captures_iter(row_html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    if cells.len() < 7 {
        return None;
    }

    let author = non_empty(strip_tags(cells[1]));
    let title = non_empty(strip_tags(cells[2]));
    let publisher = non_empty(strip_tags(cells[3]));
    let year = non_empty(strip_tags(cells[4])).filter(|y| y.chars().all(|c| c.is_ascii_digit()));
    let file_size = non_empty(strip_tags(cells[5]));
    let extension = strip_tags(cells[6]).to_ascii_lowercase();

    // Rows carrying neither a title nor a format are noise (separators, ads).
    if title.is_none() && extension.is_empty() {
        return None;
    }

    // Some mirrors percent-encode the hash inside redirect hrefs; scan a
    // decoded copy of the row as well.
    let decoded_row = urlencoding::decode(row_html)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();
    let content_hash = HASH_PARAM_RE
        .captures(row_html)
        .or_else(|| HASH_PARAM_RE.captures(&decoded_row))
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_content_hash(m.as_str()))
        .unwrap_or_default();

    // The download-page reference: first link in the mirrors column(s),
    // falling back to the title link.
    let download_hint = cells
        .get(7..)
        .into_iter()
        .flatten()
        .chain(std::iter::once(&cells[2]))
        .find_map(|cell| first_href(cell))
        .and_then(|href| absolutize(&href, base));

    let mut record = BookRecord::new(SourceId::Catalog);
    record.title = title;
    record.author = author;
    record.publisher = publisher;
    record.year = year;
    record.file_size = file_size;
    record.extension = extension;
    record.content_hash = content_hash;
    record.download_hint = download_hint;
    Some(record)
}

fn first_href(cell_html: &str) -> Option<String> {
    HREF_RE
        .captures(cell_html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
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

/// Strips markup and collapses the text content of a cell.
fn strip_tags(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes the handful of entities the catalog actually emits.
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
