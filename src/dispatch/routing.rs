//! Prefix routing.
//!
//! A provider may claim literal query prefixes (e.g. `"app:"`). When the raw
//! query starts with a claimed prefix, only the providers claiming it run,
//! and they see the query with the prefix removed. Otherwise every enabled
//! provider runs against the query unchanged.

use std::sync::Arc;

use crate::providers::RegisteredProvider;

/// Which providers run for a query, and what they are asked.
#[derive(Debug, Clone)]
pub struct Route {
    /// The prefix that selected the providers, as the provider declared it.
    pub prefix: Option<String>,
    /// Query handed to the providers.
    pub query: String,
    pub providers: Vec<Arc<RegisteredProvider>>,
}

impl Route {
    pub fn is_prefixed(&self) -> bool {
        self.prefix.is_some()
    }
}

/// Resolve the route for `raw` over `enabled` providers.
///
/// Providers are expected to own disjoint prefixes; the first match in
/// `enabled` order wins, so callers pass them sorted by priority. Leading
/// whitespace before a prefix is ignored and the remainder is trimmed, which
/// may leave an empty query (`"app:"` asks the app provider for everything).
pub fn resolve(enabled: &[Arc<RegisteredProvider>], raw: &str) -> Route {
    let candidate = raw.trim_start();
    let matched = enabled
        .iter()
        .find_map(|provider| provider.matching_prefix(candidate));

    match matched {
        Some(prefix) => {
            let prefix = prefix.to_owned();
            let providers = enabled
                .iter()
                .filter(|provider| provider.claims_prefix(&prefix))
                .cloned()
                .collect();
            Route {
                query: candidate[prefix.len()..].trim().to_owned(),
                prefix: Some(prefix),
                providers,
            }
        }
        None => Route {
            prefix: None,
            query: raw.to_owned(),
            providers: enabled.to_vec(),
        },
    }
}
