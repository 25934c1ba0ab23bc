//! Typed records shared by the store, cache and orchestrators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Per-series model version, rendered as `v1`, `v2`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn new(number: u32) -> Option<Self> {
        (number > 0).then_some(Version(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }

    /// Version following `current`, or `v1` for a series with no versions yet.
    pub fn after(current: Option<Version>) -> Version {
        current.map_or(Version::FIRST, Version::next)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(Version::new)
            .ok_or_else(|| Error::Validation(format!("malformed version '{s}', expected v<N>")))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Either a concrete version or whichever version is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRef {
    Latest,
    Exact(Version),
}

impl FromStr for VersionRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("latest") {
            Ok(VersionRef::Latest)
        } else {
            s.parse().map(VersionRef::Exact)
        }
    }
}

impl From<Option<Version>> for VersionRef {
    fn from(v: Option<Version>) -> Self {
        v.map_or(VersionRef::Latest, VersionRef::Exact)
    }
}

/// The parameters inference needs. Always cached and passed around whole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
    pub version: Version,
}

impl ModelParams {
    /// Rejects parameters a scorer must never see (zero spread, non-finite fields).
    pub fn validate(&self) -> Result<()> {
        if !self.mean.is_finite() || !self.std.is_finite() || !self.threshold.is_finite() {
            return Err(Error::Validation("model parameters must be finite".into()));
        }
        if self.std <= 0.0 {
            return Err(Error::Validation("model std must be positive".into()));
        }
        if self.threshold <= 0.0 {
            return Err(Error::Validation("model threshold must be positive".into()));
        }
        Ok(())
    }
}

/// Descriptive statistics of a training sample, kept with the version for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub start_time: i64,
    pub end_time: i64,
}

/// One row of `trained_models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub series_id: String,
    pub version: Version,
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
    pub training_points: u32,
    pub training_stats: TrainingStats,
    pub training_latency_ms: Option<f64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl TrainedModel {
    pub fn params(&self) -> ModelParams {
        ModelParams {
            mean: self.mean,
            std: self.std,
            threshold: self.threshold,
            version: self.version,
        }
    }
}

/// Raw `(timestamp, value)` sample, ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl Samples {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }
}

/// One row of `training_data`: the sample a version was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    pub series_id: String,
    pub version: Version,
    pub samples: Samples,
    pub points_count: u32,
    pub created_at: i64,
}

/// Everything `commit_version` needs to write a new version and its sample.
#[derive(Debug, Clone)]
pub struct NewModel {
    pub series_id: String,
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
    pub training_points: u32,
    pub training_stats: TrainingStats,
    pub training_latency_ms: Option<f64>,
    pub samples: Samples,
}

/// One row of `prediction_logs`. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLog {
    pub series_id: String,
    pub timestamp: i64,
    pub value: f64,
    pub anomaly: bool,
    pub version: Version,
    pub deviation: f64,
    pub confidence: f64,
    pub inference_latency_ms: Option<f64>,
    pub database_latency_ms: Option<f64>,
    pub total_latency_ms: Option<f64>,
    pub created_at: i64,
}

/// Aggregates reported by the health view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_models: u64,
    /// Equals the number of series trained at least once.
    pub active_models: u64,
    pub models_trained_since: u64,
    pub avg_training_latency_ms: f64,
    pub p95_training_latency_ms: f64,
    pub predictions_since: u64,
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
