//! Mean / population-std fitting and the k-sigma decision rule. Pure functions only.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ModelParams, Samples, TrainingStats};

pub const DEFAULT_THRESHOLD: f64 = 3.0;
pub const MIN_TRAINING_POINTS: usize = 2;

/// Arithmetic mean and population standard deviation (divides by N).
///
/// Fails with `InvalidTrainingData` for fewer than two points, non-finite input,
/// or a constant series, which has no usable band.
pub fn fit(values: &[f64]) -> Result<(f64, f64)> {
    if values.len() < MIN_TRAINING_POINTS {
        return Err(Error::InvalidTrainingData(format!(
            "insufficient training data (minimum {MIN_TRAINING_POINTS} points required, got {})",
            values.len()
        )));
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidTrainingData(format!(
            "non-finite value at position {pos}"
        )));
    }
    // A constant series can still come out with std ~1e-17 from rounding.
    if values.iter().all(|v| *v == values[0]) {
        return Err(Error::InvalidTrainingData(
            "constant values detected, standard deviation is zero".into(),
        ));
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if !mean.is_finite() || !std.is_finite() {
        return Err(Error::InvalidTrainingData("values overflow double precision".into()));
    }
    if std == 0.0 {
        return Err(Error::InvalidTrainingData("standard deviation is zero".into()));
    }
    Ok((mean, std))
}

/// True when `value` lies strictly outside `mean ± threshold·std`.
pub fn score(value: f64, mean: f64, std: f64, threshold: f64) -> bool {
    (value - mean).abs() > threshold * std
}

/// Distance from the mean in standard deviations.
pub fn deviation(value: f64, mean: f64, std: f64) -> f64 {
    (value - mean).abs() / std
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionDetails {
    pub anomaly: bool,
    pub deviation: f64,
    /// `min(deviation / threshold, 1)` for anomalies, 1 for normal points.
    pub confidence: f64,
    pub threshold_used: f64,
}

pub fn details(value: f64, params: &ModelParams) -> PredictionDetails {
    let anomaly = score(value, params.mean, params.std, params.threshold);
    let deviation = deviation(value, params.mean, params.std);
    let confidence = if anomaly {
        (deviation / params.threshold).min(1.0)
    } else {
        1.0
    };
    PredictionDetails {
        anomaly,
        deviation,
        confidence,
        threshold_used: params.threshold,
    }
}

/// Descriptive stats of a validated, timestamp-ordered sample.
pub fn summarize(samples: &Samples, mean: f64, std: f64) -> TrainingStats {
    let min = samples.values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    TrainingStats {
        count: samples.len(),
        mean,
        std,
        min,
        max,
        start_time: samples.timestamps.first().copied().unwrap_or_default(),
        end_time: samples.timestamps.last().copied().unwrap_or_default(),
    }
}

/// Average and 95th percentile (nearest-rank, clamped) of latency samples.
pub fn latency_summary(latencies: &mut [f64]) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }
    latencies.sort_by(f64::total_cmp);
    let avg = latencies.iter().sum::<f64>() / latencies.len() as f64;
    let idx = ((latencies.len() as f64) * 0.95) as usize;
    let p95 = latencies[idx.min(latencies.len() - 1)];
    (avg, p95)
}
