use serde_json::Value;
use sigmaguard::{ModelList, PlotResponse};

use super::client::ApiClient;
use crate::output::{print_json, print_rows, OutputFormat};

pub async fn plot(
    client: &ApiClient,
    series_id: &str,
    version: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let mut query = vec![("series_id", series_id)];
    if let Some(v) = version {
        query.push(("version", v));
    }
    let plot: PlotResponse = client.get(&["plot"], &query).await?;
    if format == OutputFormat::Json {
        return print_json(&plot);
    }

    let rows: Vec<Vec<String>> = plot
        .data_points
        .iter()
        .map(|p| {
            vec![
                p.timestamp.to_string(),
                p.value.to_string(),
                format!("{:.3}", p.deviation),
                if p.is_anomaly { "yes".into() } else { String::new() },
            ]
        })
        .collect();
    print_rows(&["timestamp", "value", "deviation", "anomaly"], &rows, format)?;
    if format == OutputFormat::Table {
        println!(
            "{} {}: mean={:.4} std={:.4} threshold={} | {} points, {} anomalies ({:.1}%)",
            plot.series_id,
            plot.model_version,
            plot.model_stats.mean,
            plot.model_stats.std,
            plot.model_stats.threshold,
            plot.summary.total_points,
            plot.summary.anomalies_count,
            plot.summary.anomaly_rate * 100.0
        );
    }
    Ok(())
}

pub async fn models(client: &ApiClient, series_id: &str, format: OutputFormat) -> Result<(), String> {
    let list: ModelList = client.get(&["models", series_id], &[]).await?;
    if format == OutputFormat::Json {
        return print_json(&list);
    }

    let rows: Vec<Vec<String>> = list
        .models
        .iter()
        .map(|m| {
            vec![
                m.version.to_string(),
                if m.is_active { "*".into() } else { String::new() },
                format!("{:.4}", m.mean),
                format!("{:.4}", m.std),
                m.threshold.to_string(),
                m.training_points.to_string(),
                m.created_at.to_string(),
            ]
        })
        .collect();
    print_rows(
        &["version", "active", "mean", "std", "threshold", "points", "created_at"],
        &rows,
        format,
    )
}

pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<(), String> {
    let report: Value = client.get(&["healthcheck"], &[]).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }

    let field = |path: &[&str]| -> String {
        let mut v = &report;
        for key in path {
            v = &v[*key];
        }
        match v {
            Value::String(s) => s.clone(),
            Value::Null => "-".into(),
            other => other.to_string(),
        }
    };
    let rows = vec![
        vec!["status".into(), field(&["status"])],
        vec!["store connected".into(), field(&["store_connected"])],
        vec!["series trained".into(), field(&["series_trained"])],
        vec!["models (total)".into(), field(&["store", "total_models"])],
        vec!["models trained 24h".into(), field(&["store", "models_trained_since"])],
        vec!["avg training ms".into(), field(&["store", "avg_training_latency_ms"])],
        vec!["p95 training ms".into(), field(&["store", "p95_training_latency_ms"])],
        vec!["predictions 24h".into(), field(&["store", "predictions_since"])],
        vec!["model cache hits".into(), field(&["model_cache", "hits"])],
        vec!["model cache misses".into(), field(&["model_cache", "misses"])],
        vec!["log writes failed".into(), field(&["prediction_log", "failed"])],
    ];
    print_rows(&["metric", "value"], &rows, format)
}
