pub mod config;
pub mod notify;
pub mod routes;

use std::sync::Arc;

use sigmaguard::Service;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Install the fmt subscriber. `RUST_LOG` wins over the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the web server until Ctrl-C, then flush prediction logs and close the store.
pub async fn run(config: Config) -> Result<(), String> {
    init_tracing();

    tracing::info!("Starting sigmaguard serve on {}", config.listen_addr);
    match &config.database_url {
        Some(url) => tracing::info!("Database: {}", redact(url)),
        None => tracing::info!("Database: in-memory"),
    }

    let service = Service::open(config.database_url.as_deref(), config.service.clone())
        .await
        .map_err(|e| format!("Failed to open store: {e}"))?;
    let service = Arc::new(service);

    // Cross-process cache invalidation
    let listener_task = config
        .database_url
        .clone()
        .map(|url| notify::start_listener(url, Arc::clone(&service)));

    let app = routes::build_router(Arc::clone(&service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", config.listen_addr))?;

    tracing::info!("Listening on {}", config.listen_addr);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(task) = listener_task {
        task.abort();
    }
    service.close().await;
    served.map_err(|e| format!("Server error: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Hide the password in a connection URL before logging it.
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}
