//! Versioned per-series anomaly models: fit a mean/std band, serve it through a
//! TTL cache, and keep every version and scored point in a durable store.

pub mod cache;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod monitor;
pub mod prediction_log;
pub mod schema;
pub mod stats;
pub mod store;
pub mod training;

use std::sync::Arc;

use tracing::info;

pub use cache::{CacheStats, ModelCache, ModelParamsCache, PredictionMemo, TtlCache};
pub use config::ServiceConfig;
pub use error::{Error, ErrorKind, Result};
pub use inference::{PredictRequest, PredictResponse, Predictor, Timestamp};
pub use model::{ModelParams, TrainedModel, TrainingData, Version, VersionRef};
pub use monitor::{HealthReport, ModelList, Monitor, PlotResponse};
pub use prediction_log::PredictionLogger;
pub use store::{MemoryStore, PgStore, SeriesStore};
pub use training::{TrainRequest, TrainResponse, Trainer};

/// The store, cache and orchestrators wired together, with an explicit lifecycle.
pub struct Service {
    store: Arc<dyn SeriesStore>,
    logger: Arc<PredictionLogger>,
    trainer: Trainer,
    predictor: Arc<Predictor>,
    monitor: Monitor,
}

impl Service {
    /// Wires the orchestrators around an already-open store and cache.
    /// Must be called inside a tokio runtime (spawns the prediction log writer).
    pub fn new(
        store: Arc<dyn SeriesStore>,
        cache: Arc<dyn ModelCache>,
        config: ServiceConfig,
    ) -> Self {
        let memo = Arc::new(PredictionMemo::new(config.prediction_ttl));
        let logger = Arc::new(PredictionLogger::spawn(
            Arc::clone(&store),
            config.log_capacity,
        ));
        let trainer = Trainer::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&memo),
            config.clone(),
        );
        let predictor = Arc::new(Predictor::new(
            Arc::clone(&store),
            cache,
            memo,
            Arc::clone(&logger),
            config.clone(),
        ));
        let monitor = Monitor::new(
            Arc::clone(&store),
            Arc::clone(&predictor),
            Arc::clone(&logger),
            config.store_timeout,
        );
        Self {
            store,
            logger,
            trainer,
            predictor,
            monitor,
        }
    }

    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ModelParamsCache::new()),
            config,
        )
    }

    /// Opens Postgres when a connection string is given, otherwise an in-memory store.
    pub async fn open(database_url: Option<&str>, config: ServiceConfig) -> Result<Self> {
        let store: Arc<dyn SeriesStore> = match database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                info!("no connection configured, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(
            store,
            Arc::new(ModelParamsCache::new()),
            config,
        ))
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        &self.store
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub async fn train(&self, series_id: &str, request: TrainRequest) -> Result<TrainResponse> {
        self.trainer.train(series_id, request).await
    }

    /// Scores against the active version, or the pinned one when `version` is given.
    pub async fn predict(
        &self,
        series_id: &str,
        version: Option<Version>,
        request: PredictRequest,
    ) -> Result<PredictResponse> {
        match version {
            Some(v) => self.predictor.predict_version(series_id, v, request).await,
            None => self.predictor.predict(series_id, request).await,
        }
    }

    /// Drops cached state for a series, e.g. after another process committed `committed`.
    pub async fn invalidate(&self, series_id: &str, committed: Option<Version>) {
        self.trainer.invalidate(series_id, committed).await;
    }

    /// Flushes pending prediction logs, then releases the store.
    pub async fn close(&self) {
        self.logger.close().await;
        self.store.close().await;
        info!(
            written = self.logger.written(),
            failed = self.logger.failed(),
            dropped = self.logger.dropped(),
            "service closed"
        );
    }
}
