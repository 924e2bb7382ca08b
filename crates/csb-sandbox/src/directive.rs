//! Code block directive parsing.
//!
//! A fenced code block requests a sandbox through its info string:
//!
//! ````markdown
//! ```jsx codesandbox=react?module=/src/App.js style=height:300px
//! ````
//!
//! Everything after the language is a whitespace separated list of
//! `key=value` tokens. Tokens that do not look like an assignment are
//! ignored, so parsing never fails.

use std::collections::HashMap;

use crate::consts::DIRECTIVE_KEY;

/// Parse the meta part of a fence info string into attributes.
///
/// Each token is split at its first `=`. Tokens without `=`, or starting
/// with one, are skipped. A repeated key keeps its last value.
#[must_use]
pub fn parse_directive(meta: &str) -> HashMap<String, String> {
    meta.split_whitespace()
        .filter_map(|token| match token.find('=') {
            Some(index) if index > 0 => Some((
                token[..index].to_owned(),
                token[index + 1..].to_owned(),
            )),
            _ => None,
        })
        .collect()
}

/// Split a directive value into template id and optional query.
///
/// Only the first `?` separates; later ones stay in the query.
#[must_use]
pub fn split_template_and_query(value: &str) -> (&str, Option<&str>) {
    match value.split_once('?') {
        Some((template, query)) => (template, Some(query)),
        None => (value, None),
    }
}

/// A sandbox request found on a code block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxDirective {
    pub template_id: String,
    pub query: Option<String>,
}

impl SandboxDirective {
    /// Extract the sandbox request from parsed attributes.
    ///
    /// Returns `None` when the block carries no `codesandbox` attribute or
    /// the attribute names no template.
    #[must_use]
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Option<Self> {
        let value = attributes.get(DIRECTIVE_KEY)?;
        let (template_id, query) = split_template_and_query(value);
        if template_id.is_empty() {
            tracing::warn!(directive = %value, "Ignoring sandbox directive without template");
            return None;
        }
        Some(Self {
            template_id: template_id.to_owned(),
            query: query.filter(|q| !q.is_empty()).map(str::to_owned),
        })
    }

    /// Parse a fence meta string straight into a sandbox request.
    #[must_use]
    pub fn parse(meta: &str) -> Option<Self> {
        Self::from_attributes(&parse_directive(meta))
    }
}
