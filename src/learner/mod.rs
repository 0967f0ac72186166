//! Usage learning.
//!
//! [`UsageLearner`] turns observed query traffic into two things:
//!
//! - a ranked list of (provider, query) pairs likely to be issued again soon
//!   ([`predict_hot_queries`](UsageLearner::predict_hot_queries)), which
//!   drives [`intelligent_warmup`](UsageLearner::intelligent_warmup);
//! - a per-query caching recommendation
//!   ([`cache_strategy`](UsageLearner::cache_strategy)) whose suggested TTL
//!   the dispatcher uses for per-provider cache entries.
//!
//! Recording never fails and never blocks on I/O. The model is persisted
//! through [`ProviderState`] only when the owner asks for it.

mod model;
mod scoring;

pub use model::{
    HOURLY_RETENTION_DAYS, LearnerModel, ProviderUsage, QueryUsage, hour_of_day, size_bucket,
};
pub use scoring::QueryPrediction;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::Result;
use crate::cache::{ResultCache, WarmupReport};
use crate::store::ProviderState;
use crate::types::{CacheStrategy, ResultItem, normalize_query};

/// Configuration for the usage learner.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Suggested TTL at score 0. Default: 1 minute.
    pub min_ttl: Duration,
    /// Suggested TTL at score 1. Default: 30 minutes.
    pub max_ttl: Duration,
    /// Maximum predictions returned. Default: 20.
    pub max_predictions: usize,
    /// Frequency at which the frequency factor saturates. Default: 10.
    pub frequency_ceiling: u64,
    /// Inter-batch delay per warmup tier, hottest first.
    /// Default: 50 ms, 200 ms, 500 ms.
    pub tier_delays: [Duration; 3],
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(30 * 60),
            max_predictions: 20,
            frequency_ceiling: 10,
            tier_delays: [
                Duration::from_millis(50),
                Duration::from_millis(200),
                Duration::from_millis(500),
            ],
        }
    }
}

impl LearnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_ttl(mut self, ttl: Duration) -> Self {
        self.min_ttl = ttl;
        self
    }

    pub fn max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    pub fn max_predictions(mut self, n: usize) -> Self {
        self.max_predictions = n;
        self
    }

    pub fn frequency_ceiling(mut self, n: u64) -> Self {
        self.frequency_ceiling = n;
        self
    }

    pub fn tier_delays(mut self, delays: [Duration; 3]) -> Self {
        self.tier_delays = delays;
        self
    }
}

/// Learns from search traffic. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct UsageLearner {
    config: LearnerConfig,
    model: Mutex<LearnerModel>,
}

impl UsageLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self {
            config,
            model: Mutex::new(LearnerModel::default()),
        }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Record one provider search at the current time.
    pub fn record_search(&self, provider_id: &str, query: &str, result_count: usize, elapsed: Duration) {
        self.record_search_at(provider_id, query, result_count, elapsed, Utc::now());
    }

    /// Record one provider search at `at`.
    ///
    /// Blank queries only count towards the provider's weight.
    pub fn record_search_at(
        &self,
        provider_id: &str,
        query: &str,
        result_count: usize,
        elapsed: Duration,
        at: DateTime<Utc>,
    ) {
        let query = normalize_query(query);
        let mut model = self.model.lock();
        let usage = model.providers.entry(provider_id.to_owned()).or_default();

        usage.weight += 1;
        usage.total_elapsed_ms += elapsed.as_millis() as u64;
        usage.push_hourly(at);
        *usage
            .result_sizes
            .entry(size_bucket(result_count).to_owned())
            .or_default() += 1;

        if !query.is_empty() {
            usage
                .queries
                .entry(query)
                .and_modify(|q| {
                    q.frequency += 1;
                    q.last_used = q.last_used.max(at);
                })
                .or_insert(QueryUsage {
                    frequency: 1,
                    last_used: at,
                });
        }
    }

    /// Queries most likely to be issued again soon, hottest first.
    pub fn predict_hot_queries(&self, provider_id: Option<&str>) -> Vec<QueryPrediction> {
        self.predict_hot_queries_at(provider_id, Utc::now())
    }

    pub fn predict_hot_queries_at(
        &self,
        provider_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Vec<QueryPrediction> {
        let model = self.model.lock();
        scoring::predict(&model, provider_id, at, self.config.max_predictions)
    }

    /// Caching recommendation for one query's results.
    pub fn cache_strategy(&self, provider_id: &str, query: &str, result_count: usize) -> CacheStrategy {
        self.cache_strategy_at(provider_id, query, result_count, Utc::now())
    }

    pub fn cache_strategy_at(
        &self,
        provider_id: &str,
        query: &str,
        result_count: usize,
        at: DateTime<Utc>,
    ) -> CacheStrategy {
        let query = normalize_query(query);
        let model = self.model.lock();
        scoring::strategy(&model, &self.config, provider_id, &query, result_count, at)
    }

    /// Warm the cache with predicted queries, tier by tier.
    ///
    /// Predictions are split into thirds; the hottest third is warmed first
    /// with the shortest pacing delay. `search` receives (provider id, query).
    #[instrument(name = "learner.intelligent_warmup", skip(self, cache, search))]
    pub async fn intelligent_warmup<F, Fut>(
        &self,
        provider_id: Option<&str>,
        cache: &ResultCache,
        search: F,
    ) -> WarmupReport
    where
        F: Fn(String, String) -> Fut,
        Fut: Future<Output = Result<Vec<ResultItem>>>,
    {
        let predictions = self.predict_hot_queries(provider_id);
        let mut report = WarmupReport::default();
        if predictions.is_empty() {
            return report;
        }

        let tier_len = predictions.len().div_ceil(3);
        for (tier, (chunk, delay)) in predictions
            .chunks(tier_len)
            .zip(self.config.tier_delays)
            .enumerate()
        {
            for (provider, queries) in group_by_provider(chunk) {
                let outcome = cache
                    .warmup_paced(&provider, &queries, delay, |query| search(provider.clone(), query))
                    .await;
                debug!(tier, provider = %provider, cached = outcome.cached, "warmed tier");
                report.merge(outcome);
            }
        }
        report
    }

    /// Usage of one (provider, query) pair.
    pub fn usage(&self, provider_id: &str, query: &str) -> Option<QueryUsage> {
        self.model
            .lock()
            .query(provider_id, &normalize_query(query))
            .cloned()
    }

    /// Total searches recorded for a provider.
    pub fn provider_weight(&self, provider_id: &str) -> u64 {
        self.model
            .lock()
            .providers
            .get(provider_id)
            .map(|usage| usage.weight)
            .unwrap_or(0)
    }

    pub fn export_model(&self) -> LearnerModel {
        self.model.lock().clone()
    }

    pub fn import_model(&self, model: LearnerModel) {
        *self.model.lock() = model;
    }

    /// Forget everything learned.
    pub fn clear(&self) {
        *self.model.lock() = LearnerModel::default();
    }

    /// Persist the model.
    pub async fn save(&self, state: &ProviderState) -> Result<()> {
        let value = serde_json::to_value(self.export_model())?;
        state.set_learner_model(value).await
    }

    /// Replace the model with the persisted one. Returns whether one existed.
    pub async fn load(&self, state: &ProviderState) -> Result<bool> {
        let Some(value) = state.learner_model().await? else {
            return Ok(false);
        };
        let model: LearnerModel = serde_json::from_value(value)?;
        self.import_model(model);
        Ok(true)
    }
}

/// Group predictions by provider, keeping first-seen order of providers and
/// queries.
fn group_by_provider(predictions: &[QueryPrediction]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for prediction in predictions {
        match groups.iter_mut().find(|(p, _)| *p == prediction.provider_id) {
            Some((_, queries)) => queries.push(prediction.query.clone()),
            None => groups.push((prediction.provider_id.clone(), vec![prediction.query.clone()])),
        }
    }
    groups
}
