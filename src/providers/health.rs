//! Per-provider health counters.
//!
//! [`ProviderHealth`] accumulates failures, timeouts and an exponentially
//! weighted moving average (EWMA) of search latency. The numbers are exposed
//! for external health reporting only: a provider is never disabled because
//! of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default EWMA smoothing factor.
const DEFAULT_ALPHA: f64 = 0.2;

/// Lock-free health counters for one provider.
pub struct ProviderHealth {
    errors: AtomicU64,
    timeouts: AtomicU64,
    /// EWMA latency in microseconds, as `f64` bits.
    ewma_micros: AtomicU64,
    observations: AtomicU64,
    alpha: f64,
}

impl ProviderHealth {
    pub fn new() -> Self {
        Self::with_alpha(DEFAULT_ALPHA)
    }

    /// Create counters with a custom EWMA smoothing factor in `[0, 1]`.
    pub fn with_alpha(alpha: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&alpha), "alpha must be in [0.0, 1.0]");
        Self {
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            ewma_micros: AtomicU64::new(0_f64.to_bits()),
            observations: AtomicU64::new(0),
            alpha,
        }
    }

    /// Count one failed call (error, panic or timeout).
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one timeout. Timeouts are also errors; callers record both.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one search duration into the latency average.
    ///
    /// Two concurrent first observations may both initialise the average;
    /// it converges after a few more samples.
    pub fn record_latency(&self, duration: Duration) {
        let micros = duration.as_micros() as f64;
        loop {
            let current_bits = self.ewma_micros.load(Ordering::Relaxed);
            let next = if self.observations.load(Ordering::Relaxed) == 0 {
                micros
            } else {
                self.alpha * micros + (1.0 - self.alpha) * f64::from_bits(current_bits)
            };
            if self
                .ewma_micros
                .compare_exchange_weak(
                    current_bits,
                    next.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.observations.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Smoothed latency, or `None` before the first observation.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.observations.load(Ordering::Relaxed) == 0 {
            return None;
        }
        let micros = f64::from_bits(self.ewma_micros.load(Ordering::Relaxed));
        Some(Duration::from_micros(micros as u64))
    }

    pub fn observation_count(&self) -> u64 {
        self.observations.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            errors: self.error_count(),
            timeouts: self.timeout_count(),
            average_latency: self.average_latency(),
            observations: self.observation_count(),
        }
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHealth")
            .field("errors", &self.error_count())
            .field("timeouts", &self.timeout_count())
            .field("average_latency", &self.average_latency())
            .finish()
    }
}

/// Copy of [`ProviderHealth`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub errors: u64,
    pub timeouts: u64,
    pub average_latency: Option<Duration>,
    pub observations: u64,
}
