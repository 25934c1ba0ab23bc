use std::path::PathBuf;

use sigmaguard::{PgStore, SeriesStore};

use crate::config::{self, Profile};
use crate::output::{print_json, OutputFormat};

/// Write `.sigmaguard/config.toml` and, when a connection is given, create the schema.
pub async fn run(
    path: Option<&str>,
    connection: Option<&str>,
    listen_addr: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let root = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().map_err(|e| format!("No current directory: {e}"))?,
    };

    if let Some(url) = connection {
        let store = PgStore::connect(url)
            .await
            .map_err(|e| format!("Failed to initialise database: {e}"))?;
        store.close().await;
    }

    let profile = Profile {
        connection: connection.map(str::to_string),
        listen_addr: listen_addr.map(str::to_string),
        ..Profile::default()
    };
    let written = config::write_project_config(&root, &profile)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "ok",
            "config": written.display().to_string(),
            "schema": connection.is_some(),
        }))?,
        _ => {
            println!("Wrote {}", written.display());
            match connection {
                Some(_) => println!("Schema ready"),
                None => println!("No connection set; `serve` will use the in-memory store"),
            }
        }
    }
    Ok(())
}
