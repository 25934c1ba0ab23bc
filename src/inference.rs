//! Inference orchestrator. Resolves the active model through the cache, scores the
//! point and hands the outcome to the prediction logger without waiting on it.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheStats, ModelCache, PredictionMemo};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::model::{unix_now, ModelParams, PredictionLog, Version};
use crate::prediction_log::PredictionLogger;
use crate::stats::{self, PredictionDetails};
use crate::store::{timed, SeriesStore};

/// Wire timestamps are accepted as integers or as integer strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Int(i64),
    Text(String),
}

impl Timestamp {
    pub fn resolve(&self) -> Result<i64> {
        match self {
            Timestamp::Int(ts) => Ok(*ts),
            Timestamp::Text(s) => s.trim().parse().map_err(|_| {
                Error::Validation(format!("timestamp must be an integer, got '{s}'"))
            }),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ts: i64) -> Self {
        Timestamp::Int(ts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl PredictRequest {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp: Timestamp::Int(timestamp),
            value,
        }
    }

    fn validate(&self) -> Result<i64> {
        if !self.value.is_finite() {
            return Err(Error::Validation("value must be a finite number".into()));
        }
        self.timestamp.resolve()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub anomaly: bool,
    pub model_version: Version,
}

pub struct Predictor {
    store: Arc<dyn SeriesStore>,
    cache: Arc<dyn ModelCache>,
    memo: Arc<PredictionMemo>,
    logger: Arc<PredictionLogger>,
    config: ServiceConfig,
}

impl Predictor {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        cache: Arc<dyn ModelCache>,
        memo: Arc<PredictionMemo>,
        logger: Arc<PredictionLogger>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            cache,
            memo,
            logger,
            config,
        }
    }

    /// Classifies a point against the active version of `series_id`.
    pub async fn predict(&self, series_id: &str, request: PredictRequest) -> Result<PredictResponse> {
        let started = Instant::now();
        let timestamp = request.validate()?;

        if let Some(hit) = self.memo.get(series_id, timestamp, request.value) {
            debug!(series_id, timestamp, "memoized prediction");
            return Ok(hit);
        }

        let (params, db_ms) = self.resolve_active(series_id).await?;
        let response = self.score(series_id, timestamp, request.value, &params, db_ms, started);
        self.memo
            .insert(series_id, timestamp, request.value, response.clone());
        Ok(response)
    }

    /// Classifies against a pinned version, straight from the store.
    pub async fn predict_version(
        &self,
        series_id: &str,
        version: Version,
        request: PredictRequest,
    ) -> Result<PredictResponse> {
        let started = Instant::now();
        let timestamp = request.validate()?;

        let db_started = Instant::now();
        let model = timed(
            self.config.store_timeout,
            self.store.get_version(series_id, version),
        )
        .await?
        .ok_or_else(|| Error::NotFound(format!("version {version} of series {series_id}")))?;
        let db_ms = elapsed_ms(db_started);

        Ok(self.score(series_id, timestamp, request.value, &model.params(), Some(db_ms), started))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn memo_stats(&self) -> CacheStats {
        self.memo.stats()
    }

    /// Cache first; on a miss or a cache fault, the store. Returns the store latency when
    /// the store was consulted.
    async fn resolve_active(&self, series_id: &str) -> Result<(ModelParams, Option<f64>)> {
        match self.cache.get(series_id).await {
            Ok(Some(params)) => return Ok((params, None)),
            Ok(None) => {}
            Err(e) => warn!(series_id, "model cache unavailable, reading store: {}", e),
        }

        let db_started = Instant::now();
        let params = timed(self.config.store_timeout, self.store.get_active(series_id))
            .await?
            .ok_or_else(|| Error::ModelNotFound(series_id.to_string()))?;
        let db_ms = elapsed_ms(db_started);

        if let Err(e) = self
            .cache
            .put(series_id, params, self.config.model_ttl)
            .await
        {
            warn!(series_id, "failed to cache model parameters: {}", e);
        }
        Ok((params, Some(db_ms)))
    }

    fn score(
        &self,
        series_id: &str,
        timestamp: i64,
        value: f64,
        params: &ModelParams,
        db_ms: Option<f64>,
        started: Instant,
    ) -> PredictResponse {
        let scoring = Instant::now();
        let PredictionDetails {
            anomaly,
            deviation,
            confidence,
            ..
        } = stats::details(value, params);
        let inference_ms = elapsed_ms(scoring);

        self.logger.record(PredictionLog {
            series_id: series_id.to_string(),
            timestamp,
            value,
            anomaly,
            version: params.version,
            deviation,
            confidence,
            inference_latency_ms: Some(inference_ms),
            database_latency_ms: db_ms,
            total_latency_ms: Some(elapsed_ms(started)),
            created_at: unix_now(),
        });

        if anomaly {
            debug!(series_id, timestamp, value, deviation, version = %params.version, "anomaly");
        }
        PredictResponse {
            anomaly,
            model_version: params.version,
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
