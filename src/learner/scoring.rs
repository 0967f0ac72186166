//! Hot-query prediction and cache strategy scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LearnerConfig;
use super::model::{LearnerModel, QueryUsage};
use crate::types::{CachePriority, CacheStrategy};

const RECENCY_WINDOW_HOURS: f64 = 24.0;
/// Provider weight at which the popularity factor saturates.
const POPULARITY_SATURATION: f64 = 1_000.0;
/// Result count at which the size factor saturates.
const SIZE_SATURATION: f64 = 20.0;

const FREQUENCY_WEIGHT: f64 = 0.4;
const RECENCY_WEIGHT: f64 = 0.3;
const POPULARITY_WEIGHT: f64 = 0.2;
const SIZE_WEIGHT: f64 = 0.1;

/// A (provider, query) pair ranked by likelihood of reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPrediction {
    pub provider_id: String,
    pub query: String,
    pub score: f64,
    pub frequency: u64,
    pub last_used: DateTime<Utc>,
}

/// 1 when used at `at`, falling linearly to 0 at 24 hours.
fn recency(last_used: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    let age_hours = (at - last_used).num_milliseconds().max(0) as f64 / 3_600_000.0;
    (1.0 - age_hours / RECENCY_WINDOW_HOURS).clamp(0.0, 1.0)
}

pub(super) fn predict(
    model: &LearnerModel,
    provider_id: Option<&str>,
    at: DateTime<Utc>,
    limit: usize,
) -> Vec<QueryPrediction> {
    let providers = model
        .providers
        .iter()
        .filter(|(id, _)| provider_id.is_none_or(|wanted| wanted == id.as_str()));

    let candidates: Vec<(&String, &String, &QueryUsage, f64)> = providers
        .flat_map(|(id, usage)| {
            let seasonal = 1.0 + usage.same_hour_uses(at) as f64 / 100.0;
            let popularity = ((usage.weight + 1) as f64).ln();
            usage
                .queries
                .iter()
                .map(move |(query, q)| (id, query, q, seasonal * popularity))
        })
        .collect();

    let max_frequency = candidates.iter().map(|(_, _, q, _)| q.frequency).max().unwrap_or(0);
    if max_frequency == 0 {
        return Vec::new();
    }

    let mut predictions: Vec<QueryPrediction> = candidates
        .into_iter()
        .map(|(id, query, usage, provider_factor)| {
            let frequency = usage.frequency as f64 / max_frequency as f64;
            QueryPrediction {
                provider_id: id.clone(),
                query: query.clone(),
                score: frequency * (1.0 + recency(usage.last_used, at)) * provider_factor,
                frequency: usage.frequency,
                last_used: usage.last_used,
            }
        })
        .collect();

    predictions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| a.query.cmp(&b.query))
    });
    predictions.truncate(limit);
    predictions
}

pub(super) fn strategy(
    model: &LearnerModel,
    config: &LearnerConfig,
    provider_id: &str,
    query: &str,
    result_count: usize,
    at: DateTime<Utc>,
) -> CacheStrategy {
    let provider = model.providers.get(provider_id);
    let usage = provider.and_then(|p| p.queries.get(query));

    let ceiling = config.frequency_ceiling.max(1) as f64;
    let frequency = usage.map_or(0.0, |u| (u.frequency as f64 / ceiling).min(1.0));
    let recent = usage.map_or(0.0, |u| recency(u.last_used, at));
    let popularity = provider.map_or(0.0, |p| {
        (((p.weight + 1) as f64).ln() / POPULARITY_SATURATION.ln()).min(1.0)
    });
    let size = (result_count as f64 / SIZE_SATURATION).min(1.0);

    let score = (FREQUENCY_WEIGHT * frequency
        + RECENCY_WEIGHT * recent
        + POPULARITY_WEIGHT * popularity
        + SIZE_WEIGHT * size)
        .clamp(0.0, 1.0);

    let mut reasons = Vec::new();
    if frequency >= 0.5 {
        reasons.push("high-frequency query");
    }
    if recent > 0.7 {
        reasons.push("recently used");
    }
    if popularity > 0.6 {
        reasons.push("popular provider");
    }
    if size > 0.5 {
        reasons.push("large result set");
    }
    let reason = if reasons.is_empty() {
        "infrequent query".to_owned()
    } else {
        reasons.join(", ")
    };

    let (min, max) = (config.min_ttl, config.max_ttl.max(config.min_ttl));
    let suggested_ttl = min + (max - min).mul_f64(score);

    CacheStrategy {
        priority: CachePriority::from_score(score),
        confidence: score,
        reason,
        suggested_ttl,
    }
}
