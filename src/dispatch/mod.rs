//! Query dispatch.
//!
//! [`QueryDispatcher::search`] turns one raw query into one ranked,
//! deduplicated, size-bounded result list:
//!
//! ```text
//! raw query ──► blank? ──► empty list
//!                 │
//!                 ▼
//!          prefix routing ──► global cache hit? ──► cached list
//!                                   │ miss
//!                                   ▼
//!              ┌───────── fan-out (concurrent) ─────────┐
//!              │ per provider: cache ─► init ─► search  │
//!              │   (timeout, panic and error isolation) │
//!              └───────────────────┬────────────────────┘
//!                                  ▼
//!                      merge ─► dedup ─► sort ─► truncate
//!                                  │
//!                                  ▼
//!                        global cache + usage record
//! ```
//!
//! A provider that fails, panics or exceeds the timeout contributes nothing
//! and has its error counter incremented; the other providers are not
//! affected. `search` itself never fails.

pub mod merge;
pub mod routing;

pub use merge::merge_results;
pub use routing::{Route, resolve};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::cache::{CacheKey, GLOBAL_SCOPE, ResultCache};
use crate::events::{BrokerEvent, EventBus};
use crate::learner::UsageLearner;
use crate::providers::{ProviderRegistry, RegisteredProvider};
use crate::store::UsageSample;
use crate::types::{QueryContext, ResultItem};
use crate::{MuninnError, Result, telemetry};

/// Configuration for the dispatcher.
///
/// ```rust
/// # use muninn::DispatchConfig;
/// # use std::time::Duration;
/// let config = DispatchConfig::new()
///     .max_results(20)
///     .provider_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Result cap when the caller gives none. Default: 50.
    pub max_results: usize,
    /// Per-provider search timeout. Default: 3 seconds.
    pub provider_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_results: 50,
            provider_timeout: Duration::from_secs(3),
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}

/// Fans queries out to providers and merges the answers.
pub struct QueryDispatcher {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ResultCache>,
    learner: Arc<UsageLearner>,
    events: Arc<EventBus>,
    config: DispatchConfig,
}

impl QueryDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<ResultCache>,
        learner: Arc<UsageLearner>,
        config: DispatchConfig,
    ) -> Self {
        let events = Arc::clone(registry.events());
        Self {
            registry,
            cache,
            learner,
            events,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Search all routed providers for `raw`.
    ///
    /// `max_results` defaults to [`DispatchConfig::max_results`]. Blank
    /// queries return an empty list without touching the cache or emitting
    /// events. Any other query emits `SearchStarted`, `ResultsReady` and
    /// `SearchEnded`, even when dispatch panics internally (the result is
    /// then empty).
    #[instrument(name = "dispatch.search", skip(self, raw), fields(query = %raw))]
    pub async fn search(&self, raw: &str, max_results: Option<usize>) -> Vec<ResultItem> {
        let context = QueryContext::new(raw);
        if context.is_blank() {
            return Vec::new();
        }
        let cap = max_results.unwrap_or(self.config.max_results);
        let started = Instant::now();

        self.events.emit(&BrokerEvent::SearchStarted {
            query: raw.to_owned(),
        });

        let results = match AssertUnwindSafe(self.dispatch(context.with_max_results(cap)))
            .catch_unwind()
            .await
        {
            Ok(results) => results,
            Err(_) => {
                error!("dispatch panicked; returning no results");
                Vec::new()
            }
        };

        let elapsed = started.elapsed();
        metrics::histogram!(telemetry::DISPATCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
        self.events.emit(&BrokerEvent::ResultsReady {
            query: raw.to_owned(),
            results: results.clone(),
        });
        self.events.emit(&BrokerEvent::SearchEnded {
            query: raw.to_owned(),
            result_count: results.len(),
            elapsed,
        });
        results
    }

    async fn dispatch(&self, context: QueryContext) -> Vec<ResultItem> {
        let started = Instant::now();
        let cap = context.max_results().unwrap_or(self.config.max_results);
        let route = resolve(&self.registry.list_enabled(), context.raw());
        let global_key = CacheKey::global(context.normalized(), cap);
        debug!(
            prefixed = route.is_prefixed(),
            providers = route.providers.len(),
            "route resolved"
        );

        let mut provider_context = QueryContext::new(route.query.as_str()).with_max_results(cap);
        if let Some(ref prefix) = route.prefix {
            provider_context = provider_context.with_prefix(prefix.as_str());
        }

        if let Some(cached) = self.cache.get(&global_key) {
            debug!(results = cached.len(), "global cache hit");
            for provider in &route.providers {
                let count = cached.iter().filter(|i| i.provider_id == provider.id()).count();
                self.learner
                    .record_search(provider.id(), provider_context.normalized(), count, Duration::ZERO);
            }
            self.record_usage(GLOBAL_SCOPE, started.elapsed(), cached.len(), false)
                .await;
            return cached;
        }

        if route.providers.is_empty() {
            debug!("no enabled provider for query");
        }

        let outcomes = join_all(
            route
                .providers
                .iter()
                .map(|provider| self.run_provider(provider, &provider_context)),
        )
        .await;
        let (lists, mut samples): (Vec<_>, Vec<_>) = outcomes.into_iter().unzip();

        let merged = merge_results(lists, cap);
        self.cache.set(global_key, merged.clone(), None);
        samples.push(UsageSample::new(GLOBAL_SCOPE, started.elapsed(), merged.len(), false));
        if let Err(e) = self.registry.state().accumulate_usage_batch(&samples).await {
            warn!(error = %e, "failed to record usage metrics");
        }
        merged
    }

    /// One provider's share of a dispatch: cache, then a guarded call.
    /// Always yields a list, failures an empty one, plus the usage sample
    /// the caller persists with the rest of the dispatch.
    async fn run_provider(
        &self,
        provider: &RegisteredProvider,
        context: &QueryContext,
    ) -> (Vec<ResultItem>, UsageSample) {
        let id = provider.id();
        let key = CacheKey::provider(id, context.normalized());
        let started = Instant::now();

        if let Some(cached) = self.cache.get(&key) {
            let elapsed = started.elapsed();
            self.learner
                .record_search(id, context.normalized(), cached.len(), elapsed);
            let sample = UsageSample::new(id, elapsed, cached.len(), false);
            return (cached, sample);
        }

        let outcome = self.call_provider(provider, context).await;
        let elapsed = started.elapsed();
        Self::record_request(id, elapsed, status_of(&outcome));
        let (items, failed) = match outcome {
            Ok(items) => {
                provider.health().record_latency(elapsed);
                (items, false)
            }
            Err(e) => {
                warn!(provider = id, error = %e, "provider search failed");
                (Vec::new(), true)
            }
        };

        if !items.is_empty() {
            let strategy = self
                .learner
                .cache_strategy(id, context.normalized(), items.len());
            self.cache
                .set(key, items.clone(), Some(strategy.suggested_ttl));
        }
        self.learner
            .record_search(id, context.normalized(), items.len(), elapsed);
        let sample = UsageSample::new(id, elapsed, items.len(), failed);
        (items, sample)
    }

    /// Lazy initialization plus one search, both under the timeout, with
    /// panics caught. Error and timeout counters are updated here; returned
    /// items are stamped with the provider id.
    async fn call_provider(&self, provider: &RegisteredProvider, context: &QueryContext) -> Result<Vec<ResultItem>> {
        let id = provider.id();
        let timeout = self.config.provider_timeout;

        // The bool marks errors already counted by `ensure_initialized`.
        let attempt = async {
            if let Err(e) = provider.ensure_initialized().await {
                return Err((e, true));
            }
            match AssertUnwindSafe(provider.provider().search(context))
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(|e| (e, false)),
                Err(_) => Err((
                    MuninnError::Panicked {
                        provider: id.to_owned(),
                    },
                    false,
                )),
            }
        };

        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                provider.health().record_timeout();
                metrics::counter!(telemetry::PROVIDER_TIMEOUTS_TOTAL, "provider" => id.to_owned())
                    .increment(1);
                Err((
                    MuninnError::Timeout {
                        provider: id.to_owned(),
                        after: timeout,
                    },
                    false,
                ))
            }
        };

        match outcome {
            Ok(mut items) => {
                for item in &mut items {
                    item.provider_id = id.to_owned();
                }
                Ok(items)
            }
            Err((e, counted)) => {
                if !counted {
                    provider.health().record_error();
                }
                Err(e)
            }
        }
    }

    /// Search one provider outside of a dispatch, for cache warmup.
    ///
    /// Goes through the same guarded call as a dispatch but records nothing
    /// in the learner, so warmup does not feed its own predictions.
    pub async fn warm_search(&self, provider_id: &str, query: &str) -> Result<Vec<ResultItem>> {
        let provider = self
            .registry
            .get(provider_id)
            .ok_or_else(|| MuninnError::UnknownProvider(provider_id.to_owned()))?;
        if !provider.is_enabled() {
            return Err(MuninnError::provider(provider_id, "provider is disabled"));
        }
        let context = QueryContext::new(query).with_max_results(self.config.max_results);
        let started = Instant::now();
        let outcome = self.call_provider(&provider, &context).await;
        let elapsed = started.elapsed();
        if outcome.is_ok() {
            provider.health().record_latency(elapsed);
        }
        Self::record_request(provider_id, elapsed, status_of(&outcome));
        outcome
    }

    async fn record_usage(&self, scope: &str, elapsed: Duration, result_count: usize, failed: bool) {
        if let Err(e) = self
            .registry
            .state()
            .accumulate_usage(scope, elapsed, result_count, failed)
            .await
        {
            warn!(scope, error = %e, "failed to record usage metrics");
        }
    }

    /// Record provider request metrics (counter + histogram).
    fn record_request(provider: &str, elapsed: Duration, status: &'static str) {
        metrics::counter!(telemetry::PROVIDER_REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::PROVIDER_DURATION_SECONDS,
            "provider" => provider.to_owned(),
        )
        .record(elapsed.as_secs_f64());
    }
}

/// `status` label of a finished provider call.
fn status_of(outcome: &Result<Vec<ResultItem>>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(MuninnError::Timeout { .. }) => "timeout",
        Err(_) => "error",
    }
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("config", &self.config)
            .field("providers", &self.registry.len())
            .finish_non_exhaustive()
    }
}
