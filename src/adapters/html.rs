//! Minimal HTML helpers for scraping adapters.
//!
//! Pages are scanned with regular expressions rather than parsed into a
//! DOM; these helpers clean up the captured fragments.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").ok());

/// Remove tags, decode common entities, collapse whitespace
pub fn strip_tags(fragment: &str) -> String {
    let text = match TAG.as_ref() {
        Some(re) => re.replace_all(fragment, " ").into_owned(),
        None => fragment.to_string(),
    };
    normalize_ws(&decode_entities(&text))
}

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the handful of entities that show up in names
pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// First capture group of `re` in `haystack`, if any
pub fn capture<'h>(re: &LazyLock<Option<Regex>>, haystack: &'h str) -> Option<&'h str> {
    re.as_ref()?
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
