//! Training orchestrator: validate, fit, commit a new version, then refresh caches.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{ModelCache, PredictionMemo};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::model::{NewModel, Samples, Version};
use crate::stats;
use crate::store::{timed, SeriesStore};

fn default_threshold() -> f64 {
    stats::DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl TrainRequest {
    pub fn new(timestamps: Vec<i64>, values: Vec<f64>) -> Self {
        Self {
            timestamps,
            values,
            threshold: stats::DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Checks shape and returns the sample ordered by timestamp (stable for ties).
    fn validate(self, series_id: &str) -> Result<(Samples, f64)> {
        if series_id.trim().is_empty() {
            return Err(Error::Validation("series_id must not be empty".into()));
        }
        if self.timestamps.len() != self.values.len() {
            return Err(Error::Validation(format!(
                "timestamps and values must have the same length ({} != {})",
                self.timestamps.len(),
                self.values.len()
            )));
        }
        if self.values.len() < stats::MIN_TRAINING_POINTS {
            return Err(Error::InvalidTrainingData(format!(
                "insufficient training data (minimum {} points required, got {})",
                stats::MIN_TRAINING_POINTS,
                self.values.len()
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(Error::Validation(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if let Some(pos) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidTrainingData(format!(
                "non-finite value at position {pos}"
            )));
        }

        let mut points: Vec<(i64, f64)> = self.timestamps.into_iter().zip(self.values).collect();
        points.sort_by_key(|(ts, _)| *ts);
        let (timestamps, values) = points.into_iter().unzip();
        Ok((Samples { timestamps, values }, self.threshold))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResponse {
    pub series_id: String,
    pub version: Version,
    pub points_used: u32,
}

pub struct Trainer {
    store: Arc<dyn SeriesStore>,
    cache: Arc<dyn ModelCache>,
    memo: Arc<PredictionMemo>,
    config: ServiceConfig,
}

impl Trainer {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        cache: Arc<dyn ModelCache>,
        memo: Arc<PredictionMemo>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            cache,
            memo,
            config,
        }
    }

    /// Fits a model on the request's sample and commits it as the new active version.
    ///
    /// Not idempotent: every successful call creates a version, even for identical data.
    pub async fn train(&self, series_id: &str, request: TrainRequest) -> Result<TrainResponse> {
        let started = Instant::now();
        let (samples, threshold) = request.validate(series_id)?;

        let (mean, std) = stats::fit(&samples.values)?;
        let training_stats = stats::summarize(&samples, mean, std);
        let training_points = u32::try_from(samples.len())
            .map_err(|_| Error::Validation("too many training points".into()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let model = NewModel {
            series_id: series_id.to_string(),
            mean,
            std,
            threshold,
            training_points,
            training_stats,
            training_latency_ms: Some(latency_ms),
            samples,
        };

        let version = self.commit(model).await?;
        info!(
            series_id,
            %version,
            points = training_points,
            mean,
            std,
            latency_ms,
            "trained model"
        );

        if self.config.invalidate_on_train {
            self.invalidate(series_id, Some(version)).await;
        }

        Ok(TrainResponse {
            series_id: series_id.to_string(),
            version,
            points_used: training_points,
        })
    }

    /// Commits under the store timeout, retrying once if a concurrent commit took the
    /// same version number.
    async fn commit(&self, model: NewModel) -> Result<Version> {
        let limit = self.config.store_timeout;
        match timed(limit, self.store.commit_version(model.clone())).await {
            Err(Error::Conflict(detail)) => {
                warn!(series_id = %model.series_id, "version conflict, retrying once: {}", detail);
                timed(limit, self.store.commit_version(model)).await
            }
            other => other,
        }
    }

    /// Drops cached parameters and memoized predictions for the series. With the
    /// `committed` version known, results of older versions are kept out afterwards.
    /// Failures are logged; entries expire on their own.
    pub async fn invalidate(&self, series_id: &str, committed: Option<Version>) {
        if let Err(e) = self.cache.invalidate(series_id, committed).await {
            warn!(series_id, "cache invalidation failed: {}", e);
        }
        self.memo.invalidate_series(series_id, committed);
    }
}
