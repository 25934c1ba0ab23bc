use sigmaguard::{PredictRequest, PredictResponse, Timestamp};

use super::client::ApiClient;
use crate::output::{print_json, OutputFormat};

pub async fn run(
    client: &ApiClient,
    series_id: &str,
    timestamp: &str,
    value: f64,
    version: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let request = PredictRequest {
        timestamp: Timestamp::Text(timestamp.to_string()),
        value,
    };
    let query: Vec<(&str, &str)> = version.map(|v| ("version", v)).into_iter().collect();

    let resp: PredictResponse = client
        .post(&["predict", series_id], &query, &request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&resp)?,
        _ => {
            let verdict = if resp.anomaly { "ANOMALY" } else { "normal" };
            println!("{series_id} @ {timestamp} = {value}: {verdict} ({})", resp.model_version);
        }
    }
    Ok(())
}
