//! Result items returned by providers.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Opaque invocation handle carried by a result.
///
/// The broker never interprets actions; the UI layer dispatches on `kind`
/// (e.g. `"launch"`, `"copy"`, `"open-path"`) and reads `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultAction {
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl ResultAction {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// A single search result.
///
/// `id` is the deduplication identity: two items sharing it describe the same
/// logical entity, even when produced by different providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: f64,
    /// Originating provider. Stamped by the dispatcher.
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub action: ResultAction,
}

impl ResultItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: 0.0,
            provider_id: String::new(),
            action: ResultAction::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_action(mut self, action: ResultAction) -> Self {
        self.action = action;
        self
    }

    /// Ranking order: higher priority first, then title ascending.
    ///
    /// `Ordering::Less` means `self` ranks ahead of `other`.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| self.title.cmp(&other.title))
    }
}
