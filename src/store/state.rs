//! Typed provider state on top of a [`Store`].

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Store;
use crate::Result;
use crate::types::ProviderSettings;

const INDEX_KEY: &str = "providers.index";
const LEARNER_KEY: &str = "learner.model";
const SNAPSHOT_VERSION: u32 = 1;

fn enabled_key(id: &str) -> String {
    format!("provider.{id}.enabled")
}

fn settings_key(id: &str) -> String {
    format!("provider.{id}.settings")
}

fn usage_key(id: &str) -> String {
    format!("provider.{id}.usage")
}

/// Accumulated search metrics for one provider (or the `"global"` scope).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub searches: u64,
    pub failures: u64,
    pub results: u64,
    pub total_elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl UsageMetrics {
    /// Mean search duration, or `None` before the first search.
    pub fn average_elapsed(&self) -> Option<Duration> {
        (self.searches > 0).then(|| Duration::from_millis(self.total_elapsed_ms / self.searches))
    }

    /// Fold one search outcome into the totals.
    pub fn record(&mut self, elapsed: Duration, result_count: usize, failed: bool, at: DateTime<Utc>) {
        self.searches += 1;
        if failed {
            self.failures += 1;
        }
        self.results += result_count as u64;
        self.total_elapsed_ms += elapsed.as_millis() as u64;
        self.last_used = Some(at);
    }
}

/// One search outcome waiting to be folded into a scope's usage metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub scope: String,
    pub elapsed: Duration,
    pub result_count: usize,
    pub failed: bool,
}

impl UsageSample {
    pub fn new(scope: impl Into<String>, elapsed: Duration, result_count: usize, failed: bool) -> Self {
        Self {
            scope: scope.into(),
            elapsed,
            result_count,
            failed,
        }
    }
}

/// Everything persisted for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ProviderSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
}

/// Whole-state export, used for backup/restore and cross-session continuity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner: Option<serde_json::Value>,
}

/// Typed access to persisted provider state.
///
/// Keeps an index of every provider id it has written for, so a full
/// [`StateSnapshot`] can be produced from a store that only supports
/// `get`/`set`.
#[derive(Clone)]
pub struct ProviderState {
    store: Arc<dyn Store>,
}

impl ProviderState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, serde_json::to_value(value)?).await
    }

    async fn track(&self, id: &str) -> Result<()> {
        let mut index: Vec<String> = self.read(INDEX_KEY).await?.unwrap_or_default();
        if !index.iter().any(|known| known == id) {
            index.push(id.to_string());
            self.write(INDEX_KEY, &index).await?;
        }
        Ok(())
    }

    /// Provider ids with any persisted state.
    pub async fn provider_ids(&self) -> Result<Vec<String>> {
        Ok(self.read(INDEX_KEY).await?.unwrap_or_default())
    }

    pub async fn enabled_flag(&self, id: &str) -> Result<Option<bool>> {
        self.read(&enabled_key(id)).await
    }

    pub async fn set_enabled_flag(&self, id: &str, enabled: bool) -> Result<()> {
        self.write(&enabled_key(id), &enabled).await?;
        self.track(id).await
    }

    pub async fn settings(&self, id: &str) -> Result<Option<ProviderSettings>> {
        self.read(&settings_key(id)).await
    }

    pub async fn set_settings(&self, id: &str, settings: &ProviderSettings) -> Result<()> {
        self.write(&settings_key(id), settings).await?;
        self.track(id).await
    }

    pub async fn usage(&self, id: &str) -> Result<Option<UsageMetrics>> {
        self.read(&usage_key(id)).await
    }

    pub async fn set_usage(&self, id: &str, usage: &UsageMetrics) -> Result<()> {
        self.write(&usage_key(id), usage).await?;
        self.track(id).await
    }

    /// Read-modify-write one search outcome into the usage metrics.
    ///
    /// Concurrent accumulations for the same id are last-writer-wins; usage
    /// metrics are approximate.
    pub async fn accumulate_usage(
        &self,
        id: &str,
        elapsed: Duration,
        result_count: usize,
        failed: bool,
    ) -> Result<UsageMetrics> {
        let mut usage = self.usage(id).await?.unwrap_or_default();
        usage.record(elapsed, result_count, failed, Utc::now());
        self.set_usage(id, &usage).await?;
        Ok(usage)
    }

    /// Fold a batch of search outcomes into the usage metrics with a single
    /// store write.
    ///
    /// Samples for the same scope accumulate in order. Like
    /// [`accumulate_usage`](Self::accumulate_usage), concurrent batches are
    /// last-writer-wins.
    pub async fn accumulate_usage_batch(&self, samples: &[UsageSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut totals: BTreeMap<&str, UsageMetrics> = BTreeMap::new();
        for sample in samples {
            let usage = match totals.entry(sample.scope.as_str()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.usage(&sample.scope).await?.unwrap_or_default()),
            };
            usage.record(sample.elapsed, sample.result_count, sample.failed, now);
        }

        let mut index = self.provider_ids().await?;
        let mut writes = Vec::with_capacity(totals.len() + 1);
        let mut index_changed = false;
        for (scope, usage) in &totals {
            if !index.iter().any(|known| known.as_str() == *scope) {
                index.push((*scope).to_string());
                index_changed = true;
            }
            writes.push((usage_key(scope), serde_json::to_value(usage)?));
        }
        if index_changed {
            writes.push((INDEX_KEY.to_string(), serde_json::to_value(&index)?));
        }
        self.store.set_many(writes).await
    }

    pub async fn learner_model(&self) -> Result<Option<serde_json::Value>> {
        self.store.get(LEARNER_KEY).await
    }

    pub async fn set_learner_model(&self, model: serde_json::Value) -> Result<()> {
        self.store.set(LEARNER_KEY, model).await
    }

    /// Export all persisted state as one serializable value.
    pub async fn export_snapshot(&self) -> Result<StateSnapshot> {
        let mut providers = BTreeMap::new();
        for id in self.provider_ids().await? {
            let snapshot = ProviderSnapshot {
                enabled: self.enabled_flag(&id).await?,
                settings: self.settings(&id).await?,
                usage: self.usage(&id).await?,
            };
            providers.insert(id, snapshot);
        }
        Ok(StateSnapshot {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            providers,
            learner: self.learner_model().await?,
        })
    }

    /// Restore state from a snapshot, overwriting any keys it contains.
    pub async fn import_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                version = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "importing snapshot with unexpected version"
            );
        }
        for (id, provider) in &snapshot.providers {
            if let Some(enabled) = provider.enabled {
                self.set_enabled_flag(id, enabled).await?;
            }
            if let Some(ref settings) = provider.settings {
                self.set_settings(id, settings).await?;
            }
            if let Some(ref usage) = provider.usage {
                self.set_usage(id, usage).await?;
            }
        }
        if let Some(ref learner) = snapshot.learner {
            self.set_learner_model(learner.clone()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderState").finish_non_exhaustive()
    }
}
