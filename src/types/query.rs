//! Query context handed to providers.

use serde::{Deserialize, Serialize};

/// Normalize a raw query for matching and cache keys: trimmed and lower-cased.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Immutable per-dispatch view of a query.
///
/// Built once by the dispatcher and shared by reference with every provider
/// taking part in the fan-out. When prefix routing applies, `raw` is the query
/// with the prefix already stripped and `prefix` records what was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    raw: String,
    normalized: String,
    keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
}

impl QueryContext {
    /// Build a context from a raw query string.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_query(&raw);
        let keywords = normalized.split_whitespace().map(str::to_owned).collect();
        Self {
            raw,
            normalized,
            keywords,
            max_results: None,
            prefix: None,
        }
    }

    /// Attach a result cap.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Record the routing prefix that was stripped from the query.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The query as typed (minus any routing prefix).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Trimmed, lower-cased query.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whitespace-separated tokens of the normalized query.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Maximum number of merged results requested by the caller.
    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    /// Routing prefix stripped from the query, if prefix routing applied.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether the normalized query is empty.
    pub fn is_blank(&self) -> bool {
        self.normalized.is_empty()
    }
}
