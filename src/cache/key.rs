//! Cache key derivation.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::normalize_query;

/// Scope used for merged, multi-provider results.
pub const GLOBAL_SCOPE: &str = "global";

/// Key of one cache entry.
///
/// The scope (a provider id, or [`GLOBAL_SCOPE`]) is kept in clear so entries
/// can be invalidated per provider; the normalized query and the serialized
/// extra parameters are folded into a SipHash digest. `DefaultHasher::new()`
/// uses fixed keys, so digests are stable for a given build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scope: String,
    digest: u64,
}

impl CacheKey {
    /// Key for `query` under `scope`, with arbitrary extra parameters.
    pub fn with_params(scope: impl Into<String>, query: &str, params: &serde_json::Value) -> Self {
        let mut hasher = DefaultHasher::new();
        normalize_query(query).hash(&mut hasher);
        // `Value`'s Display is its compact JSON serialization.
        params.to_string().hash(&mut hasher);
        Self {
            scope: scope.into(),
            digest: hasher.finish(),
        }
    }

    /// Per-provider key. Provider results do not depend on the result cap.
    pub fn provider(provider_id: &str, query: &str) -> Self {
        Self::with_params(provider_id, query, &serde_json::Value::Null)
    }

    /// Key for merged results of the full query with the given cap.
    pub fn global(query: &str, max_results: usize) -> Self {
        Self::with_params(
            GLOBAL_SCOPE,
            query,
            &serde_json::json!({ "max_results": max_results }),
        )
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_SCOPE
    }

    /// Metric label for this key's scope.
    pub(crate) fn scope_label(&self) -> &'static str {
        if self.is_global() { "global" } else { "provider" }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.scope, self.digest)
    }
}
