//! Text helpers for slugs, HTML bodies, and meta fields.

use std::sync::LazyLock;

use deunicode::deunicode;
use regex::Regex;
use visapress_shared::new_id;

/// Turn arbitrary text into a URL slug made of `[a-z0-9-]`.
///
/// Non-ASCII letters are transliterated first (`ş` → `s`, `Москва` →
/// `moskva`). The result can still be empty; see [`slug_or_fallback`].
pub fn slugify(input: &str) -> String {
    static NON_SLUG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lowered = deunicode(input.trim()).to_lowercase();
    NON_SLUG_RE
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .chars()
        .take(96)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Slug from the model's own slug, else the title, else a random one.
///
/// Never empty: an empty slug would route to the section index.
pub fn slug_or_fallback(explicit: Option<&str>, title: &str) -> String {
    explicit
        .map(slugify)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(slugify(title)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            let id = new_id();
            let tail = &id[id.len().saturating_sub(8)..];
            format!("article-{tail}")
        })
}

/// Remove HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let no_tags = TAG_RE.replace_all(html, " ");
    let decoded = no_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

/// Count words in an HTML or plain-text body.
pub fn count_words(body: &str) -> u32 {
    strip_html(body)
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count() as u32
}

/// Truncate to at most `max` characters on a word boundary where possible.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > max / 2 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}
