//! Telemetry metric name constants.
//!
//! Centralised metric names for broker operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider id (e.g. "apps", "files")
//! - `status`: outcome: "ok", "error" or "timeout"
//! - `scope`: cache scope: "global" or "provider"

/// Total provider invocations made by the dispatcher (cache misses only).
///
/// Labels: `provider`, `status` ("ok" | "error" | "timeout").
pub const PROVIDER_REQUESTS_TOTAL: &str = "muninn_provider_requests_total";

/// Provider invocation duration in seconds.
///
/// Labels: `provider`.
pub const PROVIDER_DURATION_SECONDS: &str = "muninn_provider_duration_seconds";

/// Total provider invocations abandoned because they exceeded the timeout.
///
/// Labels: `provider`.
pub const PROVIDER_TIMEOUTS_TOTAL: &str = "muninn_provider_timeouts_total";

/// End-to-end dispatch duration in seconds.
pub const DISPATCH_DURATION_SECONDS: &str = "muninn_dispatch_duration_seconds";

/// Total result cache hits.
///
/// Labels: `scope`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total result cache misses.
///
/// Labels: `scope`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total entries evicted to respect the entry or memory budget.
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";
