use tokio_postgres::Client;

use crate::error::Result;
use crate::model::Version;

// Table: model_series, one row per series; its row lock serializes commits
pub const TABLE_MODEL_SERIES: &str = r#"
CREATE TABLE IF NOT EXISTS model_series (
    series_id      TEXT PRIMARY KEY,
    latest_version INTEGER NOT NULL DEFAULT 0
);
"#;

// Table: trained_models, one row per series x version
pub const TABLE_TRAINED_MODELS: &str = r#"
CREATE TABLE IF NOT EXISTS trained_models (
    id                  BIGSERIAL PRIMARY KEY,
    series_id           TEXT NOT NULL,
    model_type          TEXT NOT NULL DEFAULT 'anomaly_detection',
    version             INTEGER NOT NULL CHECK (version > 0),
    mean                DOUBLE PRECISION NOT NULL,
    std                 DOUBLE PRECISION NOT NULL CHECK (std > 0),
    threshold           DOUBLE PRECISION NOT NULL CHECK (threshold > 0),
    training_points     INTEGER NOT NULL,
    training_stats      JSONB NOT NULL DEFAULT '{}'::jsonb,
    training_latency_ms DOUBLE PRECISION,
    is_active           BOOLEAN NOT NULL DEFAULT true,
    created_at          BIGINT NOT NULL,
    updated_at          BIGINT NOT NULL,
    CONSTRAINT uq_series_version UNIQUE (series_id, version)
);

-- Only one active version per series
CREATE UNIQUE INDEX IF NOT EXISTS idx_trained_models_active
    ON trained_models (series_id) WHERE is_active = true;

CREATE INDEX IF NOT EXISTS idx_trained_models_created ON trained_models (created_at);
"#;

// Table: training_data, the raw sample each version was fitted on
pub const TABLE_TRAINING_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS training_data (
    id                BIGSERIAL PRIMARY KEY,
    series_id         TEXT NOT NULL,
    version           INTEGER NOT NULL,
    sample_timestamps BIGINT[] NOT NULL,
    sample_values     DOUBLE PRECISION[] NOT NULL,
    points_count      INTEGER NOT NULL,
    created_at        BIGINT NOT NULL,
    FOREIGN KEY (series_id, version) REFERENCES trained_models (series_id, version),
    CONSTRAINT uq_training_data_version UNIQUE (series_id, version)
);
"#;

// Table: prediction_logs, append-only audit trail of scored points
pub const TABLE_PREDICTION_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS prediction_logs (
    id                   BIGSERIAL PRIMARY KEY,
    series_id            TEXT NOT NULL,
    timestamp            BIGINT NOT NULL,
    value                DOUBLE PRECISION NOT NULL,
    prediction           BOOLEAN NOT NULL,
    version              INTEGER NOT NULL,
    deviation            DOUBLE PRECISION NOT NULL,
    confidence           DOUBLE PRECISION NOT NULL,
    inference_latency_ms DOUBLE PRECISION,
    database_latency_ms  DOUBLE PRECISION,
    total_latency_ms     DOUBLE PRECISION,
    created_at           BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prediction_logs_series ON prediction_logs (series_id);
CREATE INDEX IF NOT EXISTS idx_prediction_logs_created ON prediction_logs (created_at);
"#;

/// Channel a commit notifies on, so other processes can drop cached params.
pub const MODEL_CHANNEL: &str = "sigmaguard_models";

/// `v<N>:<series_id>`. The version goes first since series ids may contain `:`.
pub fn commit_payload(series_id: &str, version: Version) -> String {
    format!("{version}:{series_id}")
}

/// Inverse of [`commit_payload`]. A payload without a version prefix is taken as a
/// bare series id.
pub fn parse_commit_payload(payload: &str) -> (&str, Option<Version>) {
    match payload.split_once(':') {
        Some((version, series_id)) => match version.parse() {
            Ok(v) => (series_id, Some(v)),
            Err(_) => (payload, None),
        },
        None => (payload, None),
    }
}

/// Create all tables and indexes. Idempotent.
pub async fn bootstrap(client: &Client) -> Result<()> {
    for ddl in [
        TABLE_MODEL_SERIES,
        TABLE_TRAINED_MODELS,
        TABLE_TRAINING_DATA,
        TABLE_PREDICTION_LOGS,
    ] {
        client.batch_execute(ddl).await?;
    }
    tracing::info!("schema ready");
    Ok(())
}
