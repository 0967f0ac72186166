//! The broker: one explicit instance wiring registry, dispatcher, cache and
//! learner together.
//!
//! Everything a UI layer needs goes through [`Broker`]: provider management,
//! searching, event subscription, predictions, warmup, statistics and
//! state persistence. Components are reachable individually for callers
//! that need finer control.

mod builder;

pub use builder::{Muninn, MuninnBuilder};

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::cache::{CacheStats, GLOBAL_SCOPE, ResultCache, SweepHandle, WarmupReport};
use crate::dispatch::QueryDispatcher;
use crate::events::{BrokerEvent, EventBus, ListenerId};
use crate::learner::{QueryPrediction, UsageLearner};
use crate::providers::{HealthSnapshot, ProviderRegistry, RegisteredProvider, SearchProvider};
use crate::store::{ProviderState, StateSnapshot};
use crate::types::{CacheStrategy, ProviderSettings, ResultItem};

/// Federated query broker. Build one with [`Muninn::builder`].
pub struct Broker {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ResultCache>,
    learner: Arc<UsageLearner>,
    dispatcher: Arc<QueryDispatcher>,
    events: Arc<EventBus>,
    _sweeper: Option<SweepHandle>,
}

impl Broker {
    // ========================================================================
    // Providers
    // ========================================================================

    /// Register a provider. Fails if its id is already taken.
    ///
    /// Merged results cached before the provider joined are dropped.
    pub async fn register(&self, provider: Arc<dyn SearchProvider>) -> Result<Arc<RegisteredProvider>> {
        let entry = self.registry.register(provider).await?;
        self.invalidate(entry.id());
        Ok(entry)
    }

    /// Unregister a provider and drop everything cached from it.
    /// Unknown ids are logged and ignored.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        self.registry.unregister(id).await?;
        self.invalidate(id);
        Ok(())
    }

    /// Enable a provider. Merged results cached while it was off are dropped.
    pub async fn enable(&self, id: &str) -> Result<()> {
        self.registry.enable(id).await?;
        self.cache.invalidate_provider(GLOBAL_SCOPE);
        Ok(())
    }

    /// Disable a provider. Merged results that may contain its items are
    /// dropped.
    pub async fn disable(&self, id: &str) -> Result<()> {
        self.registry.disable(id).await?;
        self.cache.invalidate_provider(GLOBAL_SCOPE);
        Ok(())
    }

    /// Apply new settings to a provider and invalidate results cached under
    /// the old ones. Returns the settings with schema defaults filled in.
    pub async fn configure(&self, id: &str, settings: ProviderSettings) -> Result<ProviderSettings> {
        let resolved = self.registry.configure(id, settings).await?;
        self.invalidate(id);
        Ok(resolved)
    }

    fn invalidate(&self, id: &str) {
        let own = self.cache.invalidate_provider(id);
        let merged = self.cache.invalidate_provider(GLOBAL_SCOPE);
        debug!(provider = id, own, merged, "invalidated cached results");
    }

    /// Registered providers, highest priority first.
    pub fn providers(&self) -> Vec<Arc<RegisteredProvider>> {
        self.registry.list()
    }

    pub fn provider_health(&self, id: &str) -> Option<HealthSnapshot> {
        self.registry.health(id)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Search with the default result cap. Never fails.
    pub async fn search(&self, query: &str) -> Vec<ResultItem> {
        self.dispatcher.search(query, None).await
    }

    /// Search with an explicit result cap. Never fails.
    pub async fn search_with_limit(&self, query: &str, max_results: usize) -> Vec<ResultItem> {
        self.dispatcher.search(query, Some(max_results)).await
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BrokerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    // ========================================================================
    // Learning and warmup
    // ========================================================================

    pub fn predict_hot_queries(&self, provider_id: Option<&str>) -> Vec<QueryPrediction> {
        self.learner.predict_hot_queries(provider_id)
    }

    pub fn cache_strategy(&self, provider_id: &str, query: &str, result_count: usize) -> CacheStrategy {
        self.learner.cache_strategy(provider_id, query, result_count)
    }

    /// Warm one provider's cache entries for `queries`.
    #[instrument(skip(self, queries), fields(queries = queries.len()))]
    pub async fn warmup(&self, provider_id: &str, queries: &[String]) -> WarmupReport {
        let dispatcher = &self.dispatcher;
        self.cache
            .warmup(provider_id, queries, move |query| async move {
                dispatcher.warm_search(provider_id, &query).await
            })
            .await
    }

    /// Warm the cache with the learner's predicted hot queries.
    pub async fn intelligent_warmup(&self, provider_id: Option<&str>) -> WarmupReport {
        let dispatcher = &self.dispatcher;
        let report = self
            .learner
            .intelligent_warmup(provider_id, &self.cache, move |provider, query| async move {
                dispatcher.warm_search(&provider, &query).await
            })
            .await;
        info!(
            attempted = report.attempted,
            cached = report.cached,
            failed = report.failed,
            "intelligent warmup finished"
        );
        report
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persist the learned model. Provider flags and settings are persisted
    /// as they change.
    pub async fn save_state(&self) -> Result<()> {
        self.learner.save(self.registry.state()).await
    }

    /// Restore the learned model. Returns whether a saved model existed.
    pub async fn restore_state(&self) -> Result<bool> {
        self.learner.load(self.registry.state()).await
    }

    /// Export all persisted state, including the current learned model.
    pub async fn export_snapshot(&self) -> Result<StateSnapshot> {
        self.save_state().await?;
        self.registry.state().export_snapshot().await
    }

    /// Import a snapshot: persisted state is overwritten, the learned model
    /// is reloaded and enabled flags are applied to registered providers.
    pub async fn import_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.registry.state().import_snapshot(snapshot).await?;
        self.restore_state().await?;
        for (id, provider) in &snapshot.providers {
            let (Some(enabled), Some(registered)) = (provider.enabled, self.registry.get(id)) else {
                continue;
            };
            if registered.is_enabled() == enabled {
                continue;
            }
            if enabled {
                self.enable(id).await?;
            } else {
                self.disable(id).await?;
            }
        }
        Ok(())
    }

    /// Save state, then unregister every provider (running destroy hooks).
    pub async fn shutdown(&self) {
        if let Err(e) = self.save_state().await {
            warn!(error = %e, "failed to save state on shutdown");
        }
        for id in self.registry.ids() {
            if let Err(e) = self.registry.unregister(&id).await {
                warn!(provider = %id, error = %e, "failed to unregister provider");
            }
        }
        self.cache.clear();
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn learner(&self) -> &Arc<UsageLearner> {
        &self.learner
    }

    pub fn dispatcher(&self) -> &Arc<QueryDispatcher> {
        &self.dispatcher
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> &ProviderState {
        self.registry.state()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("providers", &self.registry.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
