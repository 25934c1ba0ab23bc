//! Postgres-backed store. Commits run in one transaction holding the series' row lock
//! in `model_series`; the unique and partial-unique indexes back up the versioning
//! invariants.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, info};

use super::pool::{Pool, PoolConfig};
use super::SeriesStore;
use crate::error::{Error, Result};
use crate::model::{
    unix_now, ModelParams, NewModel, PredictionLog, Samples, StoreStats, TrainedModel,
    TrainingData, Version, VersionRef,
};
use crate::schema;
use crate::stats::latency_summary;

const MODEL_COLUMNS: &str = "series_id, version, mean, std, threshold, training_points, \
     training_stats, training_latency_ms, is_active, created_at";

const DATA_COLUMNS: &str =
    "series_id, version, sample_timestamps, sample_values, points_count, created_at";

const SEED_SERIES: &str = "INSERT INTO model_series (series_id, latest_version) \
     SELECT $1::text, COALESCE(MAX(version), 0) FROM trained_models WHERE series_id = $1 \
     ON CONFLICT (series_id) DO NOTHING";

const LOCK_SERIES: &str =
    "SELECT latest_version FROM model_series WHERE series_id = $1 FOR UPDATE";

pub struct PgStore {
    pool: Arc<Pool>,
}

impl PgStore {
    /// Connects and makes sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = Pool::new(PoolConfig::new(database_url));
        {
            let client = pool.get().await?;
            schema::bootstrap(&client).await?;
        }
        info!("postgres store ready");
        Ok(Self { pool })
    }
}

fn version_to_db(version: Version) -> Result<i32> {
    i32::try_from(version.number())
        .map_err(|_| Error::Storage(format!("version {version} exceeds column range")))
}

fn version_from_db(n: i32) -> Result<Version> {
    u32::try_from(n)
        .ok()
        .and_then(Version::new)
        .ok_or_else(|| Error::Storage(format!("stored version {n} is not positive")))
}

fn count_to_db(n: u32) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::Storage(format!("count {n} exceeds column range")))
}

fn count_from_db(n: i32) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::Storage(format!("stored count {n} is negative")))
}

fn model_from_row(row: &Row) -> Result<TrainedModel> {
    let stats: serde_json::Value = row.try_get("training_stats")?;
    Ok(TrainedModel {
        series_id: row.try_get("series_id")?,
        version: version_from_db(row.try_get("version")?)?,
        mean: row.try_get("mean")?,
        std: row.try_get("std")?,
        threshold: row.try_get("threshold")?,
        training_points: count_from_db(row.try_get("training_points")?)?,
        training_stats: serde_json::from_value(stats)?,
        training_latency_ms: row.try_get("training_latency_ms")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn data_from_row(row: &Row) -> Result<TrainingData> {
    Ok(TrainingData {
        series_id: row.try_get("series_id")?,
        version: version_from_db(row.try_get("version")?)?,
        samples: Samples {
            timestamps: row.try_get("sample_timestamps")?,
            values: row.try_get("sample_values")?,
        },
        points_count: count_from_db(row.try_get("points_count")?)?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SeriesStore for PgStore {
    async fn commit_version(&self, model: NewModel) -> Result<Version> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // The per-series row lock serializes trainers of one series until commit or
        // rollback. Seeding from trained_models covers series committed before the
        // model_series table existed.
        tx.execute(SEED_SERIES, &[&model.series_id]).await?;
        let current: i32 = tx
            .query_one(LOCK_SERIES, &[&model.series_id])
            .await?
            .try_get(0)?;
        let version = Version::after(u32::try_from(current).ok().and_then(Version::new));
        let version_num = version_to_db(version)?;
        let points = count_to_db(model.training_points)?;
        let stats = serde_json::to_value(&model.training_stats)?;
        let now = unix_now();

        tx.execute(
            "UPDATE model_series SET latest_version = $2 WHERE series_id = $1",
            &[&model.series_id, &version_num],
        )
        .await?;

        tx.execute(
            "UPDATE trained_models SET is_active = false, updated_at = $2 \
             WHERE series_id = $1 AND is_active = true",
            &[&model.series_id, &now],
        )
        .await?;

        tx.execute(
            "INSERT INTO trained_models \
             (series_id, version, mean, std, threshold, training_points, training_stats, \
              training_latency_ms, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, $9, $9)",
            &[
                &model.series_id,
                &version_num,
                &model.mean,
                &model.std,
                &model.threshold,
                &points,
                &stats,
                &model.training_latency_ms,
                &now,
            ],
        )
        .await?;

        tx.execute(
            "INSERT INTO training_data \
             (series_id, version, sample_timestamps, sample_values, points_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &model.series_id,
                &version_num,
                &model.samples.timestamps,
                &model.samples.values,
                &points,
                &now,
            ],
        )
        .await?;

        // Delivered to listeners only once the transaction commits.
        let payload = schema::commit_payload(&model.series_id, version);
        tx.execute("SELECT pg_notify($1, $2)", &[&schema::MODEL_CHANNEL, &payload])
            .await?;

        tx.commit().await?;
        debug!(series_id = %model.series_id, %version, "committed version");
        Ok(version)
    }

    async fn get_active(&self, series_id: &str) -> Result<Option<ModelParams>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT mean, std, threshold, version FROM trained_models \
                 WHERE series_id = $1 AND is_active = true",
                &[&series_id],
            )
            .await?;

        row.map(|r| -> Result<ModelParams> {
            Ok(ModelParams {
                mean: r.try_get(0)?,
                std: r.try_get(1)?,
                threshold: r.try_get(2)?,
                version: version_from_db(r.try_get(3)?)?,
            })
        })
        .transpose()
    }

    async fn get_version(&self, series_id: &str, version: Version) -> Result<Option<TrainedModel>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM trained_models WHERE series_id = $1 AND version = $2"
        );
        let row = client
            .query_opt(&sql, &[&series_id, &version_to_db(version)?])
            .await?;
        row.as_ref().map(model_from_row).transpose()
    }

    async fn get_training_data(
        &self,
        series_id: &str,
        version: VersionRef,
    ) -> Result<Option<TrainingData>> {
        let client = self.pool.get().await?;
        let row = match version {
            VersionRef::Exact(v) => {
                let sql = format!(
                    "SELECT {DATA_COLUMNS} FROM training_data WHERE series_id = $1 AND version = $2"
                );
                client.query_opt(&sql, &[&series_id, &version_to_db(v)?]).await?
            }
            VersionRef::Latest => {
                let sql = format!(
                    "SELECT d.{} FROM training_data d \
                     JOIN trained_models m ON m.series_id = d.series_id AND m.version = d.version \
                     WHERE d.series_id = $1 AND m.is_active = true",
                    DATA_COLUMNS.replace(", ", ", d.")
                );
                client.query_opt(&sql, &[&series_id]).await?
            }
        };
        row.as_ref().map(data_from_row).transpose()
    }

    async fn list_versions(&self, series_id: &str) -> Result<Vec<TrainedModel>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM trained_models WHERE series_id = $1 ORDER BY version"
        );
        let rows = client.query(&sql, &[&series_id]).await?;
        rows.iter().map(model_from_row).collect()
    }

    async fn append_prediction(&self, log: PredictionLog) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO prediction_logs \
                 (series_id, timestamp, value, prediction, version, deviation, confidence, \
                  inference_latency_ms, database_latency_ms, total_latency_ms, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &log.series_id,
                    &log.timestamp,
                    &log.value,
                    &log.anomaly,
                    &version_to_db(log.version)?,
                    &log.deviation,
                    &log.confidence,
                    &log.inference_latency_ms,
                    &log.database_latency_ms,
                    &log.total_latency_ms,
                    &log.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn stats(&self, since: i64) -> Result<StoreStats> {
        let client = self.pool.get().await?;

        let counts = client
            .query_one(
                "SELECT COUNT(*), \
                        COUNT(*) FILTER (WHERE is_active), \
                        COUNT(*) FILTER (WHERE created_at >= $1) \
                 FROM trained_models",
                &[&since],
            )
            .await?;

        let mut latencies: Vec<f64> = client
            .query(
                "SELECT training_latency_ms FROM trained_models \
                 WHERE created_at >= $1 AND training_latency_ms IS NOT NULL",
                &[&since],
            )
            .await?
            .iter()
            .map(|r| r.try_get::<_, f64>(0))
            .collect::<std::result::Result<_, _>>()?;
        let (avg, p95) = latency_summary(&mut latencies);

        let predictions: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM prediction_logs WHERE created_at >= $1",
                &[&since],
            )
            .await?
            .try_get(0)?;

        let as_u64 = |n: i64| u64::try_from(n).unwrap_or_default();
        Ok(StoreStats {
            total_models: as_u64(counts.try_get(0)?),
            active_models: as_u64(counts.try_get(1)?),
            models_trained_since: as_u64(counts.try_get(2)?),
            avg_training_latency_ms: avg,
            p95_training_latency_ms: p95,
            predictions_since: as_u64(predictions),
        })
    }

    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
        info!("postgres store closed");
    }
}
