//! Slug normalization: the canonical identifier alphabet.
//!
//! A slug is lowercase ASCII `[a-z0-9]` runs joined by single hyphens.
//! `normalize` is idempotent, so already-canonical slugs pass through
//! unchanged and re-normalizing stored data is always safe.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonicalize free text into a slug.
///
/// Diacritics are removed via compatibility decomposition, and every run of
/// characters outside `[a-z0-9]` collapses to one hyphen. Leading and
/// trailing separators are dropped.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.nfkd().filter(|ch| !is_combining_mark(*ch)) {
        for lower in ch.to_lowercase() {
            if lower.is_ascii_alphanumeric() {
                if pending_separator && !out.is_empty() {
                    out.push('-');
                }
                pending_separator = false;
                out.push(lower);
            } else {
                pending_separator = true;
            }
        }
    }

    out
}

/// Whether `raw` is already in canonical form.
pub fn is_canonical(raw: &str) -> bool {
    !raw.is_empty() && normalize(raw) == raw
}

/// The raw (un-normalized) slug text carried by a JSON value.
///
/// Accepts a bare string or an object with `slug`/`name`; an explicit,
/// non-blank `slug` wins over `name`.
pub fn raw_candidate(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => ["slug", "name"].iter().find_map(|key| {
            map.get(*key)
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
        }),
        _ => None,
    }
}

/// Extract and normalize the best slug candidate from a JSON value.
pub fn slug_candidate(value: &Value) -> Option<String> {
    raw_candidate(value)
        .map(normalize)
        .filter(|slug| !slug.is_empty())
}

/// Human display name for a slug with no explicit name.
pub fn display_name(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
