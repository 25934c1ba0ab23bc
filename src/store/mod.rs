//! Durable per-series model versions: the single source of truth for "what is active".

pub mod memory;
pub mod pool;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{
    ModelParams, NewModel, PredictionLog, StoreStats, TrainedModel, TrainingData, Version,
    VersionRef,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Atomically assigns the next version, deactivates the previous active row and
    /// inserts the new model together with its training sample.
    ///
    /// Commits for the same series are serialized; different series never block
    /// each other.
    async fn commit_version(&self, model: NewModel) -> Result<Version>;

    /// Parameters of the active version. Reflects every commit that has returned.
    async fn get_active(&self, series_id: &str) -> Result<Option<ModelParams>>;

    /// A specific version, active or not.
    async fn get_version(&self, series_id: &str, version: Version) -> Result<Option<TrainedModel>>;

    async fn get_training_data(
        &self,
        series_id: &str,
        version: VersionRef,
    ) -> Result<Option<TrainingData>>;

    /// All versions of a series, oldest first.
    async fn list_versions(&self, series_id: &str) -> Result<Vec<TrainedModel>>;

    async fn append_prediction(&self, log: PredictionLog) -> Result<()>;

    /// Aggregates over models created and predictions logged at or after `since` (unix secs).
    async fn stats(&self, since: i64) -> Result<StoreStats>;

    async fn ping(&self) -> Result<()>;

    /// Releases connections. The store must not be used afterwards.
    async fn close(&self) {}
}

/// Bounds a store call; on expiry the future is dropped, which rolls back any open
/// transaction.
pub async fn timed<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit)),
    }
}
