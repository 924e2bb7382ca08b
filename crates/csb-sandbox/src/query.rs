//! Query parameter merging.
//!
//! Sandbox URLs carry editor options as a query string. Options come from
//! several places (mode defaults, configuration, the code block itself) and
//! are merged in order: a later source overwrites an existing key in place,
//! a new key is appended.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left unescaped by `application/x-www-form-urlencoded`.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// One input to [`merge_query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuerySource {
    /// Raw query string, with or without a leading `?`.
    Raw(String),
    /// Key/value pairs in order.
    Map(Vec<(String, String)>),
    /// An already merged query.
    Merged(MergedQuery),
}

impl From<&str> for QuerySource {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_owned())
    }
}

impl From<String> for QuerySource {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<Vec<(String, String)>> for QuerySource {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Map(pairs)
    }
}

impl From<MergedQuery> for QuerySource {
    fn from(query: MergedQuery) -> Self {
        Self::Merged(query)
    }
}

/// Ordered query parameters with unique keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedQuery {
    pairs: Vec<(String, String)>,
}

impl MergedQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string.
    ///
    /// `+` decodes to a space, percent escapes are decoded, a key without
    /// `=` gets an empty value. Repeated keys keep the last value at the
    /// position of the first.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut query = Self::new();
        query.merge_raw(raw);
        query
    }

    /// Set `key`, replacing its value in place or appending it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Overlay `source` onto this query.
    pub fn merge(&mut self, source: &QuerySource) {
        match source {
            QuerySource::Raw(raw) => self.merge_raw(raw),
            QuerySource::Map(pairs) => {
                for (key, value) in pairs {
                    self.set(key.as_str(), value.as_str());
                }
            }
            QuerySource::Merged(other) => {
                for (key, value) in other.iter() {
                    self.set(key, value);
                }
            }
        }
    }

    fn merge_raw(&mut self, raw: &str) {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        for segment in raw.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            self.set(decode_component(key), decode_component(value));
        }
    }

    /// Serialize as `application/x-www-form-urlencoded`.
    ///
    /// Reserved characters are percent-encoded (`/` becomes `%2F`) and
    /// spaces become `+`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for MergedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MergedQuery {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut query = Self::new();
        for (key, value) in iter {
            query.set(key, value);
        }
        query
    }
}

/// Merge query sources in order; later sources win per key.
///
/// ```
/// use csb_sandbox::{QuerySource, merge_query};
///
/// let base = QuerySource::Map(vec![
///     ("foo".to_owned(), "bar".to_owned()),
///     ("taiwan".to_owned(), "number 1".to_owned()),
/// ]);
/// let block = QuerySource::from("foo=87&code=sandbox");
///
/// let merged = merge_query([&base, &block]);
/// assert_eq!(merged.to_query_string(), "foo=87&taiwan=number+1&code=sandbox");
/// ```
#[must_use]
pub fn merge_query<'a, I>(sources: I) -> MergedQuery
where
    I: IntoIterator<Item = &'a QuerySource>,
{
    let mut merged = MergedQuery::new();
    for source in sources {
        merged.merge(source);
    }
    merged
}

/// Merge sources where any of them may be absent.
#[must_use]
pub fn merge_optional(sources: &[Option<&QuerySource>]) -> MergedQuery {
    merge_query(sources.iter().flatten().copied())
}

fn decode_component(component: &str) -> String {
    percent_decode_str(&component.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, FORM_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}
