//! In-memory provider over a fixed list of items.

use async_trait::async_trait;

use super::traits::SearchProvider;
use crate::Result;
use crate::types::{QueryContext, ResultItem};

/// Bonus added to an item's priority when its title starts with the query.
const TITLE_PREFIX_BONUS: f64 = 1.0;

/// Answers queries from a fixed item list.
///
/// An item matches when every query keyword occurs in its title or
/// description (case-insensitive). An empty query matches everything, which
/// makes a prefix-only query (e.g. `"app:"`) list the whole catalogue.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    id: String,
    name: String,
    priority: i32,
    prefixes: Vec<String>,
    items: Vec<ResultItem>,
}

impl StaticProvider {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority: 0,
            prefixes: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn item(mut self, item: ResultItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn items(mut self, items: impl IntoIterator<Item = ResultItem>) -> Self {
        self.items.extend(items);
        self
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn search_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    async fn search(&self, context: &QueryContext) -> Result<Vec<ResultItem>> {
        let query = context.normalized();
        let results = self
            .items
            .iter()
            .filter_map(|item| {
                let title = item.title.to_lowercase();
                let description = item.description.to_lowercase();
                let matches = context
                    .keywords()
                    .iter()
                    .all(|kw| title.contains(kw.as_str()) || description.contains(kw.as_str()));
                if !matches {
                    return None;
                }
                let mut hit = item.clone();
                if !query.is_empty() && title.starts_with(query) {
                    hit.priority += TITLE_PREFIX_BONUS;
                }
                Some(hit)
            })
            .collect();
        Ok(results)
    }
}
