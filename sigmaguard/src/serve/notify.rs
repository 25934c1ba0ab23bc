//! Background task: LISTEN for committed versions from any process and drop the
//! matching cache entries here.
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sigmaguard::schema::{parse_commit_payload, MODEL_CHANNEL};
use sigmaguard::Service;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, NoTls};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Start the LISTEN background task. Runs until aborted.
pub fn start_listener(database_url: String, service: Arc<Service>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listen_loop(&database_url, &service).await {
                Ok(()) => {
                    tracing::info!("LISTEN connection closed, reconnecting...");
                }
                Err(e) => {
                    tracing::error!("LISTEN error: {}, reconnecting in 2s...", e);
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

async fn listen_loop(database_url: &str, service: &Service) -> Result<(), tokio_postgres::Error> {
    let (client, mut connection) = tokio_postgres::connect(database_url, NoTls).await?;

    // The connection must be polled for LISTEN to complete, so drive it on its own task.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let driver = tokio::spawn(async move {
        let stream = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
        let mut stream = std::pin::pin!(stream);
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(AsyncMessage::Notification(n)) => {
                    if tx.send(n.payload().to_string()).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    });

    client.batch_execute(&format!("LISTEN {MODEL_CHANNEL}")).await?;
    tracing::info!("LISTEN {} started", MODEL_CHANNEL);

    while let Some(payload) = rx.recv().await {
        let (series_id, version) = parse_commit_payload(&payload);
        tracing::debug!(series_id, ?version, "version committed elsewhere, invalidating");
        service.invalidate(series_id, version).await;
    }

    match driver.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("LISTEN driver task failed: {}", e);
            Ok(())
        }
    }
}
