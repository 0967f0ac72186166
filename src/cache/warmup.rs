//! Cache warmup: populate per-provider entries ahead of user queries.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use super::{CacheKey, ResultCache};
use crate::Result;
use crate::types::ResultItem;

/// Outcome of a warmup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Queries searched.
    pub attempted: usize,
    /// Searches whose results were stored.
    pub cached: usize,
    /// Queries not searched (blank, or already cached) plus searches that
    /// returned nothing to store.
    pub skipped: usize,
    /// Searches that returned an error.
    pub failed: usize,
}

impl WarmupReport {
    pub fn merge(&mut self, other: WarmupReport) {
        self.attempted += other.attempted;
        self.cached += other.cached;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl ResultCache {
    /// Warm per-provider entries for `queries`, pacing batches with the
    /// configured delay.
    ///
    /// `search` runs one provider search; its failures are logged and
    /// counted, never propagated.
    pub async fn warmup<F, Fut>(&self, provider_id: &str, queries: &[String], search: F) -> WarmupReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Vec<ResultItem>>>,
    {
        self.warmup_paced(provider_id, queries, self.config().warmup_delay, search)
            .await
    }

    /// [`warmup`](Self::warmup) with an explicit inter-batch delay.
    #[instrument(name = "cache.warmup", skip(self, queries, search), fields(queries = queries.len()))]
    pub async fn warmup_paced<F, Fut>(
        &self,
        provider_id: &str,
        queries: &[String],
        delay: Duration,
        search: F,
    ) -> WarmupReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Vec<ResultItem>>>,
    {
        let mut report = WarmupReport::default();
        let mut pending = Vec::with_capacity(queries.len());
        for query in queries {
            if query.trim().is_empty() || self.contains(&CacheKey::provider(provider_id, query)) {
                report.skipped += 1;
            } else {
                pending.push(query.clone());
            }
        }

        let batch_size = self.config().warmup_batch_size.max(1);
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcomes = join_all(batch.iter().map(|query| {
                let fut = search(query.clone());
                async move { (query, fut.await) }
            }))
            .await;

            for (query, outcome) in outcomes {
                report.attempted += 1;
                match outcome {
                    Ok(results) => {
                        if self.set(CacheKey::provider(provider_id, query), results, None) {
                            report.cached += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(provider = provider_id, query = %query, error = %e, "warmup search failed");
                    }
                }
            }
        }

        debug!(
            provider = provider_id,
            attempted = report.attempted,
            cached = report.cached,
            failed = report.failed,
            "warmup finished"
        );
        report
    }
}
