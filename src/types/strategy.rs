//! Cache strategy recommendations produced by the usage learner.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How aggressively a query's results should be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    High,
    Medium,
    Low,
}

impl CachePriority {
    /// Tier for a blended score: `> 0.8` high, `< 0.4` low, otherwise medium.
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::High
        } else if score < 0.4 {
            Self::Low
        } else {
            Self::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, non-persisted caching recommendation for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStrategy {
    pub priority: CachePriority,
    /// Blended score in `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    #[serde(with = "duration_secs")]
    pub suggested_ttl: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
