//! Shared helpers for building the document tree.

use pulldown_cmark::HeadingLevel;

/// Convert heading level enum to number (1-6).
#[must_use]
pub(crate) fn heading_level_to_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Split a fence info string into language and meta.
///
/// The language is the first whitespace-delimited word; everything after it
/// (trimmed) is the meta string. Empty parts become `None`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     split_fence_info("jsx codesandbox=react"),
///     (Some("jsx".to_owned()), Some("codesandbox=react".to_owned()))
/// );
/// ```
#[must_use]
pub(crate) fn split_fence_info(info: &str) -> (Option<String>, Option<String>) {
    let info = info.trim();
    if info.is_empty() {
        return (None, None);
    }

    match info.split_once(char::is_whitespace) {
        Some((lang, meta)) => {
            let meta = meta.trim();
            let meta = (!meta.is_empty()).then(|| meta.to_owned());
            (Some(lang.to_owned()), meta)
        }
        None => (Some(info.to_owned()), None),
    }
}
