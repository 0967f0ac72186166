//! Serializable usage model.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How long per-hour usage timestamps are retained.
pub const HOURLY_RETENTION_DAYS: i64 = 7;

const HOURS_PER_DAY: usize = 24;

/// Usage of one (provider, normalized query) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryUsage {
    pub frequency: u64,
    pub last_used: DateTime<Utc>,
}

/// Usage aggregated for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Total searches recorded; the provider's popularity weight.
    pub weight: u64,
    #[serde(default)]
    pub total_elapsed_ms: u64,
    /// Search timestamps by local hour of day, pruned to the retention window.
    #[serde(default = "empty_hourly")]
    pub hourly: Vec<Vec<DateTime<Utc>>>,
    /// Searches per result-size bucket (see [`size_bucket`]).
    #[serde(default)]
    pub result_sizes: BTreeMap<String, u64>,
    #[serde(default)]
    pub queries: BTreeMap<String, QueryUsage>,
}

fn empty_hourly() -> Vec<Vec<DateTime<Utc>>> {
    vec![Vec::new(); HOURS_PER_DAY]
}

impl Default for ProviderUsage {
    fn default() -> Self {
        Self {
            weight: 0,
            total_elapsed_ms: 0,
            hourly: empty_hourly(),
            result_sizes: BTreeMap::new(),
            queries: BTreeMap::new(),
        }
    }
}

impl ProviderUsage {
    /// Searches recorded in the same local hour of day as `at`, within the
    /// retention window ending at `at`.
    pub fn same_hour_uses(&self, at: DateTime<Utc>) -> usize {
        let cutoff = at - ChronoDuration::days(HOURLY_RETENTION_DAYS);
        self.hourly
            .get(hour_of_day(at))
            .map(|bucket| bucket.iter().filter(|ts| **ts >= cutoff && **ts <= at).count())
            .unwrap_or(0)
    }

    pub(crate) fn push_hourly(&mut self, at: DateTime<Utc>) {
        if self.hourly.len() != HOURS_PER_DAY {
            self.hourly.resize_with(HOURS_PER_DAY, Vec::new);
        }
        let cutoff = at - ChronoDuration::days(HOURLY_RETENTION_DAYS);
        let bucket = &mut self.hourly[hour_of_day(at)];
        bucket.retain(|ts| *ts >= cutoff);
        bucket.push(at);
    }
}

/// The whole learned model. Persisted as JSON through the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerModel {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderUsage>,
}

impl LearnerModel {
    pub fn query(&self, provider_id: &str, query: &str) -> Option<&QueryUsage> {
        self.providers.get(provider_id)?.queries.get(query)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Local hour of day (0–23) of a timestamp.
pub fn hour_of_day(at: DateTime<Utc>) -> usize {
    at.with_timezone(&Local).hour() as usize
}

/// Result-set size bucket label.
pub fn size_bucket(result_count: usize) -> &'static str {
    match result_count {
        0 => "0",
        1..=5 => "1-5",
        6..=20 => "6-20",
        21..=50 => "21-50",
        _ => "51+",
    }
}
