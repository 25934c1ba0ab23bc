//! Fire-and-forget audit trail. Predictions are handed to a background writer so a
//! slow or failing log never delays or fails a request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::PredictionLog;
use crate::store::SeriesStore;

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct PredictionLogger {
    tx: Mutex<Option<mpsc::Sender<PredictionLog>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl PredictionLogger {
    /// Spawns the writer task. `capacity` bounds how many records may wait in memory.
    pub fn spawn(store: Arc<dyn SeriesStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<PredictionLog>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let task_counters = Arc::clone(&counters);
        let writer = tokio::spawn(async move {
            while let Some(log) = rx.recv().await {
                match store.append_prediction(log).await {
                    Ok(()) => {
                        task_counters.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        task_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("failed to write prediction log: {}", e);
                    }
                }
            }
            debug!("prediction log writer stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            counters,
        }
    }

    /// Queues a record. Never blocks; a full queue or a closed logger drops it.
    pub fn record(&self, log: PredictionLog) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match tx.try_send(log) {
            Ok(()) => {}
            Err(TrySendError::Full(log)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(series_id = %log.series_id, "prediction log queue full, dropping record");
            }
            Err(TrySendError::Closed(log)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(series_id = %log.series_id, "prediction log writer stopped, dropping record");
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> LogStats {
        LogStats {
            written: self.written(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }

    /// Stops accepting records and waits until everything queued has been written.
    pub async fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("prediction log writer panicked: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;
    use crate::store::MemoryStore;

    fn log(series_id: &str, timestamp: i64) -> PredictionLog {
        PredictionLog {
            series_id: series_id.into(),
            timestamp,
            value: 1.0,
            anomaly: false,
            version: Version::FIRST,
            deviation: 0.1,
            confidence: 1.0,
            inference_latency_ms: None,
            database_latency_ms: None,
            total_latency_ms: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn close_flushes_queued_records() {
        let store = Arc::new(MemoryStore::new());
        let logger = PredictionLogger::spawn(store.clone(), 16);
        for ts in 0..5 {
            logger.record(log("s1", ts));
        }
        logger.close().await;

        let written = store.predictions("s1").await;
        assert_eq!(written.len(), 5);
        assert_eq!(written[4].timestamp, 4);
        assert_eq!(logger.written(), 5);
    }

    #[tokio::test]
    async fn records_after_close_are_dropped() {
        let store = Arc::new(MemoryStore::new());
        let logger = PredictionLogger::spawn(store.clone(), 4);
        logger.close().await;
        logger.record(log("s1", 1));
        assert_eq!(logger.dropped(), 1);
        assert!(store.predictions("s1").await.is_empty());
    }
}
