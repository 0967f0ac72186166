//! Builder for broker instances

use std::sync::Arc;

use super::Broker;
use crate::cache::{CacheConfig, ResultCache};
use crate::dispatch::{DispatchConfig, QueryDispatcher};
use crate::events::EventBus;
use crate::learner::{LearnerConfig, UsageLearner};
use crate::providers::ProviderRegistry;
use crate::store::{MemoryStore, ProviderState, Store};
use crate::{MuninnError, Result};

/// Main entry point for creating broker instances.
pub struct Muninn;

impl Muninn {
    /// Create a new builder for configuring the broker.
    pub fn builder() -> MuninnBuilder {
        MuninnBuilder::new()
    }
}

/// Builder for configuring broker instances.
pub struct MuninnBuilder {
    store: Option<Arc<dyn Store>>,
    cache: CacheConfig,
    learner: LearnerConfig,
    dispatch: DispatchConfig,
    sweeper: bool,
}

impl MuninnBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            cache: CacheConfig::default(),
            learner: LearnerConfig::default(),
            dispatch: DispatchConfig::default(),
            sweeper: true,
        }
    }

    /// Persist provider state and the learned model in `store`.
    ///
    /// Defaults to a [`MemoryStore`], i.e. nothing survives the process.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn learner(mut self, config: LearnerConfig) -> Self {
        self.learner = config;
        self
    }

    pub fn dispatch(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Whether to run the periodic cache sweep. Default: on.
    ///
    /// The sweep needs a tokio runtime; when `build` runs outside one, it is
    /// skipped and expired entries are only dropped lazily.
    pub fn sweeper(mut self, enabled: bool) -> Self {
        self.sweeper = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.learner.min_ttl > self.learner.max_ttl {
            return Err(MuninnError::Configuration(format!(
                "learner min_ttl ({:?}) exceeds max_ttl ({:?})",
                self.learner.min_ttl, self.learner.max_ttl
            )));
        }
        if self.dispatch.provider_timeout.is_zero() {
            return Err(MuninnError::Configuration(
                "provider timeout must be greater than zero".into(),
            ));
        }
        if self.dispatch.max_results == 0 {
            return Err(MuninnError::Configuration(
                "max_results must be greater than zero".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(MuninnError::Configuration(
                "cache max_entries must be greater than zero".into(),
            ));
        }
        if self.cache.cleanup_interval.is_zero() {
            return Err(MuninnError::Configuration(
                "cache cleanup interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Build the broker.
    pub fn build(self) -> Result<Broker> {
        self.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn Store>);
        let state = ProviderState::new(store);
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(ProviderRegistry::new(state, Arc::clone(&events)));
        let cache = Arc::new(ResultCache::new(self.cache));
        let learner = Arc::new(UsageLearner::new(self.learner));
        let dispatcher = Arc::new(QueryDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&learner),
            self.dispatch,
        ));

        let sweeper = if self.sweeper && tokio::runtime::Handle::try_current().is_ok() {
            Some(cache.spawn_sweeper())
        } else {
            None
        };

        Ok(Broker {
            registry,
            cache,
            learner,
            dispatcher,
            events,
            _sweeper: sweeper,
        })
    }
}

impl Default for MuninnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
