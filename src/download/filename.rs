//! Filename sanitization for download destinations.
//!
//! Callers name downloads after book titles, which may contain path
//! separators, control characters, or names that are reserved on some
//! platforms. [`sanitize_filename`] makes any candidate safe to join onto
//! the download directory.

/// Maximum filename length in bytes (common filesystem limit, minus slack).
const MAX_FILENAME_LEN: usize = 200;

/// Fallback used when sanitization leaves nothing usable.
const FALLBACK_FILENAME: &str = "download";

/// Windows reserved device names (case-insensitive, extension ignored).
const RESERVED_NAMES: [&str; 22] = [
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Produces a filesystem-safe filename from an arbitrary candidate.
///
/// Path separators and characters that are illegal on common filesystems are
/// replaced with underscores, control characters are dropped, leading and
/// trailing dots/spaces are trimmed, reserved device names get a prefix, and
/// overlong names are truncated while keeping the extension.
#[must_use]
pub fn sanitize_filename(candidate: &str) -> String {
    let mut name: String = candidate
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();

    name = name.trim_matches([' ', '.']).to_string();

    if name.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let stem = name.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        name = format!("_{name}");
    }

    if name.len() > MAX_FILENAME_LEN {
        name = truncate_keeping_extension(&name, MAX_FILENAME_LEN);
    }

    name
}

/// Truncates a name to `max_len` bytes, preserving the final extension.
fn truncate_keeping_extension(name: &str, max_len: usize) -> String {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 10 => (stem, Some(ext)),
        _ => (name, None),
    };

    let reserved = extension.map_or(0, |ext| ext.len() + 1);
    let budget = max_len.saturating_sub(reserved).max(1);
    let truncated: String = stem.chars().take_while({
        let mut used = 0usize;
        move |c| {
            used += c.len_utf8();
            used <= budget
        }
    }).collect();

    match extension {
        Some(ext) => format!("{truncated}.{ext}"),
        None => truncated,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_unchanged() {
        assert_eq!(sanitize_filename("dune.epub"), "dune.epub");
    }

    #[test]
    fn test_path_separators_replaced() {
        assert_eq!(sanitize_filename("a/b\\c.pdf"), "a_b_c.pdf");
    }

    #[test]
    fn test_illegal_characters_replaced() {
        assert_eq!(sanitize_filename(r#"who? "what": x|y.pdf"#), "who_ _what__ x_y.pdf");
    }

    #[test]
    fn test_control_characters_dropped() {
        assert_eq!(sanitize_filename("du\x00ne\x1f.epub"), "dune.epub");
    }

    #[test]
    fn test_leading_trailing_dots_and_spaces_trimmed() {
        assert_eq!(sanitize_filename("  .hidden.pdf.  "), "hidden.pdf");
    }

    #[test]
    fn test_empty_input_falls_back() {
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename(" ... "), "download");
    }

    #[test]
    fn test_reserved_windows_name_prefixed() {
        assert_eq!(sanitize_filename("CON.pdf"), "_CON.pdf");
        assert_eq!(sanitize_filename("aux"), "_aux");
    }

    #[test]
    fn test_overlong_name_truncated_keeps_extension() {
        let long = format!("{}.epub", "x".repeat(400));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 200);
        assert!(sanitized.ends_with(".epub"));
    }
}
