//! Read-only views over the store for dashboards and health probes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheStats;
use crate::error::{Error, Result};
use crate::inference::Predictor;
use crate::model::{unix_now, StoreStats, TrainedModel, TrainingStats, Version, VersionRef};
use crate::prediction_log::{LogStats, PredictionLogger};
use crate::stats;
use crate::store::{timed, SeriesStore};

const HEALTH_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub timestamp: i64,
    pub value: f64,
    pub is_anomaly: bool,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSummary {
    pub total_points: usize,
    pub anomalies_count: usize,
    pub anomaly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotResponse {
    pub series_id: String,
    pub model_version: Version,
    pub data_points: Vec<PlotPoint>,
    pub model_stats: ModelStats,
    pub training_stats: TrainingStats,
    pub summary: PlotSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub series_id: String,
    pub active_version: Option<Version>,
    pub models: Vec<TrainedModel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub series_trained: u64,
    pub store: StoreStats,
    pub model_cache: CacheStats,
    pub prediction_memo: CacheStats,
    pub prediction_log: LogStats,
    pub timestamp: String,
}

pub struct Monitor {
    store: Arc<dyn SeriesStore>,
    predictor: Arc<Predictor>,
    logger: Arc<PredictionLogger>,
    store_timeout: Duration,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        predictor: Arc<Predictor>,
        logger: Arc<PredictionLogger>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            predictor,
            logger,
            store_timeout,
        }
    }

    /// The training sample of a version, each point scored under that version.
    pub async fn plot(&self, series_id: &str, version: VersionRef) -> Result<PlotResponse> {
        let data = timed(
            self.store_timeout,
            self.store.get_training_data(series_id, version),
        )
        .await?
        .ok_or_else(|| match version {
            VersionRef::Latest => Error::NotFound(format!("training data for series {series_id}")),
            VersionRef::Exact(v) => {
                Error::NotFound(format!("training data for series {series_id} version {v}"))
            }
        })?;

        let model = timed(
            self.store_timeout,
            self.store.get_version(series_id, data.version),
        )
        .await?
        .ok_or_else(|| Error::NotFound(format!("version {} of series {series_id}", data.version)))?;
        let params = model.params();

        let data_points: Vec<PlotPoint> = data
            .samples
            .iter()
            .map(|(timestamp, value)| {
                let d = stats::details(value, &params);
                PlotPoint {
                    timestamp,
                    value,
                    is_anomaly: d.anomaly,
                    deviation: d.deviation,
                }
            })
            .collect();

        let total_points = data_points.len();
        let anomalies_count = data_points.iter().filter(|p| p.is_anomaly).count();
        let anomaly_rate = if total_points == 0 {
            0.0
        } else {
            anomalies_count as f64 / total_points as f64
        };

        Ok(PlotResponse {
            series_id: series_id.to_string(),
            model_version: model.version,
            data_points,
            model_stats: ModelStats {
                mean: model.mean,
                std: model.std,
                threshold: model.threshold,
            },
            training_stats: model.training_stats,
            summary: PlotSummary {
                total_points,
                anomalies_count,
                anomaly_rate,
            },
        })
    }

    pub async fn list_models(&self, series_id: &str) -> Result<ModelList> {
        let models = timed(self.store_timeout, self.store.list_versions(series_id)).await?;
        if models.is_empty() {
            return Err(Error::NotFound(format!("models for series {series_id}")));
        }
        let active_version = models.iter().find(|m| m.is_active).map(|m| m.version);
        Ok(ModelList {
            series_id: series_id.to_string(),
            active_version,
            models,
        })
    }

    /// Never fails: an unreachable store is reported as `degraded`.
    pub async fn health(&self) -> HealthReport {
        let (status, store_error, store) = match self.probe_store().await {
            Ok(stats) => (HealthStatus::Ok, None, stats),
            Err(e) => {
                warn!("health probe failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()), StoreStats::default())
            }
        };

        HealthReport {
            status,
            store_connected: store_error.is_none(),
            store_error,
            series_trained: store.active_models,
            store,
            model_cache: self.predictor.cache_stats(),
            prediction_memo: self.predictor.memo_stats(),
            prediction_log: self.logger.stats(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn probe_store(&self) -> Result<StoreStats> {
        timed(self.store_timeout, self.store.ping()).await?;
        let since = unix_now() - HEALTH_WINDOW_SECS;
        timed(self.store_timeout, self.store.stats(since)).await
    }
}

#[cfg(test)]
mod tests {
    use crate::training::TrainRequest;
    use crate::{ErrorKind, Service, ServiceConfig, Version, VersionRef};

    use super::HealthStatus;

    #[tokio::test]
    async fn plot_scores_training_points_under_their_version() {
        let service = Service::in_memory(ServiceConfig::default());
        service
            .train(
                "s1",
                TrainRequest::new(vec![1, 2, 3, 4], vec![10.0, 10.0, 10.0, 20.0]).with_threshold(1.0),
            )
            .await
            .unwrap();

        let plot = service.monitor().plot("s1", VersionRef::Latest).await.unwrap();
        assert_eq!(plot.model_version, Version::FIRST);
        assert_eq!(plot.summary.total_points, 4);
        assert_eq!(plot.summary.anomalies_count, 1);
        assert_eq!(plot.summary.anomaly_rate, 0.25);
        assert!(plot.data_points[3].is_anomaly);
        assert_eq!(plot.training_stats.max, 20.0);
    }

    #[tokio::test]
    async fn plot_and_models_report_missing_series() {
        let service = Service::in_memory(ServiceConfig::default());
        let err = service
            .monitor()
            .plot("ghost", VersionRef::Exact(Version::FIRST))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = service.monitor().list_models("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn health_counts_trained_series() {
        let service = Service::in_memory(ServiceConfig::default());
        for series in ["a", "b"] {
            service
                .train(series, TrainRequest::new(vec![1, 2], vec![1.0, 2.0]))
                .await
                .unwrap();
        }
        service
            .train("a", TrainRequest::new(vec![1, 2], vec![3.0, 4.0]))
            .await
            .unwrap();

        let report = service.monitor().health().await;
        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.store_connected);
        assert_eq!(report.series_trained, 2);
        assert_eq!(report.store.total_models, 3);

        let models = service.monitor().list_models("a").await.unwrap();
        assert_eq!(models.active_version, Version::new(2));
        assert_eq!(models.models.len(), 2);
    }
}
