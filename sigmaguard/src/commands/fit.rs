use std::path::Path;

use sigmaguard::{TrainRequest, TrainResponse};

use super::client::ApiClient;
use crate::output::{print_json, OutputFormat};

/// Where the training sample comes from.
pub enum Sample {
    Inline { timestamps: String, values: String },
    File(String),
}

fn parse_list<T: std::str::FromStr>(raw: &str, what: &str) -> Result<Vec<T>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|_| format!("Invalid {what} '{s}'")))
        .collect()
}

/// Parse `timestamp,value` lines. A non-numeric first line is taken as a header;
/// blank lines and `#` comments are skipped.
pub fn parse_csv(content: &str) -> Result<(Vec<i64>, Vec<f64>), String> {
    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((ts, value)) = line.split_once(',') else {
            return Err(format!("line {}: expected 'timestamp,value'", i + 1));
        };
        let (ts, value) = (ts.trim(), value.trim());
        match (ts.parse::<i64>(), value.parse::<f64>()) {
            (Ok(ts), Ok(value)) => {
                timestamps.push(ts);
                values.push(value);
            }
            _ if timestamps.is_empty() && i == 0 => continue,
            _ => return Err(format!("line {}: cannot parse '{line}'", i + 1)),
        }
    }
    Ok((timestamps, values))
}

fn load_sample(sample: &Sample) -> Result<(Vec<i64>, Vec<f64>), String> {
    match sample {
        Sample::Inline { timestamps, values } => {
            Ok((parse_list(timestamps, "timestamp")?, parse_list(values, "value")?))
        }
        Sample::File(path) => {
            let content = std::fs::read_to_string(Path::new(path))
                .map_err(|e| format!("Failed to read {path}: {e}"))?;
            parse_csv(&content)
        }
    }
}

pub async fn run(
    client: &ApiClient,
    series_id: &str,
    sample: &Sample,
    threshold: Option<f64>,
    format: OutputFormat,
) -> Result<(), String> {
    let (timestamps, values) = load_sample(sample)?;
    let mut request = TrainRequest::new(timestamps, values);
    if let Some(threshold) = threshold {
        request = request.with_threshold(threshold);
    }

    let resp: TrainResponse = client
        .post(&["fit", series_id], &[], &request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&resp)?,
        _ => println!(
            "Trained {} {} on {} points",
            resp.series_id, resp.version, resp.points_used
        ),
    }
    Ok(())
}
