pub mod client;
pub mod fit;
pub mod init;
pub mod monitor;
pub mod predict;

use crate::config;
use crate::output::OutputFormat;
use crate::serve;
use client::ApiClient;

pub enum Command {
    Serve {
        addr: Option<String>,
    },
    Init {
        path: Option<String>,
        listen_addr: Option<String>,
    },
    Fit {
        series_id: String,
        sample: fit::Sample,
        threshold: Option<f64>,
    },
    Predict {
        series_id: String,
        timestamp: String,
        value: f64,
        version: Option<String>,
    },
    Plot {
        series_id: String,
        version: Option<String>,
    },
    Models {
        series_id: String,
    },
    Health,
}

pub fn run(
    command: Command,
    profile_name: &str,
    db_override: Option<&str>,
    server_override: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let profile = config::load_config(profile_name);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {e}"))?;
    let server_url = server_override
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| profile.server_url());
    let client = ApiClient::new(server_url);

    runtime.block_on(async {
        match command {
            Command::Serve { addr } => {
                let config = serve::config::Config::from_profile(&profile, db_override, addr.as_deref());
                serve::run(config).await
            }
            Command::Init { path, listen_addr } => {
                let connection = db_override.or(profile.connection.as_deref());
                init::run(path.as_deref(), connection, listen_addr.as_deref(), format).await
            }
            Command::Fit {
                series_id,
                sample,
                threshold,
            } => fit::run(&client, &series_id, &sample, threshold, format).await,
            Command::Predict {
                series_id,
                timestamp,
                value,
                version,
            } => predict::run(&client, &series_id, &timestamp, value, version.as_deref(), format).await,
            Command::Plot { series_id, version } => {
                monitor::plot(&client, &series_id, version.as_deref(), format).await
            }
            Command::Models { series_id } => monitor::models(&client, &series_id, format).await,
            Command::Health => monitor::health(&client, format).await,
        }
    })
}
