//! Single-process store. Each series sits behind its own lock, so commits for one
//! series serialize while other series proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::SeriesStore;
use crate::error::Result;
use crate::model::{
    unix_now, ModelParams, NewModel, PredictionLog, StoreStats, TrainedModel, TrainingData,
    Version, VersionRef,
};
use crate::stats::latency_summary;

#[derive(Debug, Default)]
struct SeriesState {
    models: Vec<TrainedModel>,
    samples: Vec<TrainingData>,
}

impl SeriesState {
    fn active(&self) -> Option<&TrainedModel> {
        self.models.iter().find(|m| m.is_active)
    }

    fn latest_version(&self) -> Option<Version> {
        self.models.iter().map(|m| m.version).max()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    series: RwLock<HashMap<String, Arc<RwLock<SeriesState>>>>,
    predictions: Mutex<Vec<PredictionLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn series(&self, series_id: &str) -> Option<Arc<RwLock<SeriesState>>> {
        self.series.read().await.get(series_id).cloned()
    }

    async fn series_or_insert(&self, series_id: &str) -> Arc<RwLock<SeriesState>> {
        if let Some(state) = self.series(series_id).await {
            return state;
        }
        let mut map = self.series.write().await;
        map.entry(series_id.to_string()).or_default().clone()
    }

    /// Logged predictions for one series, in append order.
    pub async fn predictions(&self, series_id: &str) -> Vec<PredictionLog> {
        self.predictions
            .lock()
            .await
            .iter()
            .filter(|p| p.series_id == series_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn commit_version(&self, model: NewModel) -> Result<Version> {
        let entry = self.series_or_insert(&model.series_id).await;
        let mut state = entry.write().await;

        let version = Version::after(state.latest_version());
        let now = unix_now();
        let created_at = state.models.last().map_or(now, |m| m.created_at.max(now));

        let trained = TrainedModel {
            series_id: model.series_id.clone(),
            version,
            mean: model.mean,
            std: model.std,
            threshold: model.threshold,
            training_points: model.training_points,
            training_stats: model.training_stats,
            training_latency_ms: model.training_latency_ms,
            is_active: true,
            created_at,
        };
        let data = TrainingData {
            series_id: model.series_id,
            version,
            points_count: model.training_points,
            samples: model.samples,
            created_at,
        };

        debug!(series_id = %trained.series_id, %version, "committing version");

        // Nothing below can fail, so the swap is all-or-nothing under the write lock.
        for m in state.models.iter_mut() {
            m.is_active = false;
        }
        state.models.push(trained);
        state.samples.push(data);
        Ok(version)
    }

    async fn get_active(&self, series_id: &str) -> Result<Option<ModelParams>> {
        let Some(entry) = self.series(series_id).await else {
            return Ok(None);
        };
        let state = entry.read().await;
        Ok(state.active().map(TrainedModel::params))
    }

    async fn get_version(&self, series_id: &str, version: Version) -> Result<Option<TrainedModel>> {
        let Some(entry) = self.series(series_id).await else {
            return Ok(None);
        };
        let state = entry.read().await;
        Ok(state.models.iter().find(|m| m.version == version).cloned())
    }

    async fn get_training_data(
        &self,
        series_id: &str,
        version: VersionRef,
    ) -> Result<Option<TrainingData>> {
        let Some(entry) = self.series(series_id).await else {
            return Ok(None);
        };
        let state = entry.read().await;
        let wanted = match version {
            VersionRef::Exact(v) => Some(v),
            VersionRef::Latest => state.active().map(|m| m.version),
        };
        Ok(wanted.and_then(|v| state.samples.iter().find(|d| d.version == v).cloned()))
    }

    async fn list_versions(&self, series_id: &str) -> Result<Vec<TrainedModel>> {
        let Some(entry) = self.series(series_id).await else {
            return Ok(Vec::new());
        };
        let state = entry.read().await;
        let mut models = state.models.clone();
        models.sort_by_key(|m| m.version);
        Ok(models)
    }

    async fn append_prediction(&self, log: PredictionLog) -> Result<()> {
        self.predictions.lock().await.push(log);
        Ok(())
    }

    async fn stats(&self, since: i64) -> Result<StoreStats> {
        let entries: Vec<_> = self.series.read().await.values().cloned().collect();

        let mut stats = StoreStats::default();
        let mut latencies = Vec::new();
        for entry in entries {
            let state = entry.read().await;
            stats.total_models += state.models.len() as u64;
            stats.active_models += u64::from(state.active().is_some());
            for m in state.models.iter().filter(|m| m.created_at >= since) {
                stats.models_trained_since += 1;
                latencies.extend(m.training_latency_ms);
            }
        }
        (stats.avg_training_latency_ms, stats.p95_training_latency_ms) =
            latency_summary(&mut latencies);

        stats.predictions_since = self
            .predictions
            .lock()
            .await
            .iter()
            .filter(|p| p.created_at >= since)
            .count() as u64;
        Ok(stats)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Samples, TrainingStats};

    fn new_model(series_id: &str, mean: f64) -> NewModel {
        let samples = Samples {
            timestamps: vec![1, 2, 3],
            values: vec![mean - 1.0, mean, mean + 1.0],
        };
        NewModel {
            series_id: series_id.to_string(),
            mean,
            std: 0.8165,
            threshold: 3.0,
            training_points: 3,
            training_stats: TrainingStats {
                count: 3,
                mean,
                std: 0.8165,
                min: mean - 1.0,
                max: mean + 1.0,
                start_time: 1,
                end_time: 3,
            },
            training_latency_ms: Some(1.5),
            samples,
        }
    }

    #[tokio::test]
    async fn first_commit_is_v1_and_active() {
        let store = MemoryStore::new();
        let v = store.commit_version(new_model("s1", 10.0)).await.unwrap();
        assert_eq!(v, Version::FIRST);

        let active = store.get_active("s1").await.unwrap().unwrap();
        assert_eq!(active.version, Version::FIRST);
        assert_eq!(active.mean, 10.0);
    }

    #[tokio::test]
    async fn retrain_deactivates_previous_version() {
        let store = MemoryStore::new();
        store.commit_version(new_model("s1", 10.0)).await.unwrap();
        let v2 = store.commit_version(new_model("s1", 20.0)).await.unwrap();
        assert_eq!(v2.to_string(), "v2");

        let active = store.get_active("s1").await.unwrap().unwrap();
        assert_eq!(active.version, v2);
        assert_eq!(active.mean, 20.0);

        let v1 = store.get_version("s1", Version::FIRST).await.unwrap().unwrap();
        assert!(!v1.is_active);
        assert_eq!(v1.mean, 10.0);

        let versions = store.list_versions("s1").await.unwrap();
        assert_eq!(versions.iter().filter(|m| m.is_active).count(), 1);
    }

    #[tokio::test]
    async fn unknown_series_reads_as_none() {
        let store = MemoryStore::new();
        assert!(store.get_active("nope").await.unwrap().is_none());
        assert!(store.get_version("nope", Version::FIRST).await.unwrap().is_none());
        assert!(store.get_training_data("nope", VersionRef::Latest).await.unwrap().is_none());
        assert!(store.list_versions("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn training_data_follows_version_ref() {
        let store = MemoryStore::new();
        store.commit_version(new_model("s1", 10.0)).await.unwrap();
        store.commit_version(new_model("s1", 20.0)).await.unwrap();

        let latest = store.get_training_data("s1", VersionRef::Latest).await.unwrap().unwrap();
        assert_eq!(latest.version.number(), 2);
        assert_eq!(latest.samples.values, vec![19.0, 20.0, 21.0]);

        let first = store
            .get_training_data("s1", VersionRef::Exact(Version::FIRST))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.samples.values, vec![9.0, 10.0, 11.0]);
        assert_eq!(first.points_count, 3);
    }

    #[tokio::test]
    async fn stats_count_models_and_predictions() {
        let store = MemoryStore::new();
        store.commit_version(new_model("a", 1.0)).await.unwrap();
        store.commit_version(new_model("a", 2.0)).await.unwrap();
        store.commit_version(new_model("b", 3.0)).await.unwrap();
        store
            .append_prediction(PredictionLog {
                series_id: "a".into(),
                timestamp: 10,
                value: 2.0,
                anomaly: false,
                version: Version::FIRST.next(),
                deviation: 0.0,
                confidence: 1.0,
                inference_latency_ms: None,
                database_latency_ms: None,
                total_latency_ms: None,
                created_at: unix_now(),
            })
            .await
            .unwrap();

        let stats = store.stats(0).await.unwrap();
        assert_eq!(stats.total_models, 3);
        assert_eq!(stats.active_models, 2);
        assert_eq!(stats.models_trained_since, 3);
        assert_eq!(stats.avg_training_latency_ms, 1.5);
        assert_eq!(stats.predictions_since, 1);
        assert_eq!(store.predictions("a").await.len(), 1);
        assert!(store.predictions("b").await.is_empty());
    }
}
