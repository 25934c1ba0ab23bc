use std::time::Duration;

/// Runtime knobs for the orchestrators. Built once at startup and passed in.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long cached model parameters may be served without consulting the store.
    pub model_ttl: Duration,
    /// Memoization window for identical predict requests. Zero disables it.
    pub prediction_ttl: Duration,
    /// Upper bound on every individual store call.
    pub store_timeout: Duration,
    /// Drop the cached entry as soon as a new version commits.
    pub invalidate_on_train: bool,
    /// Prediction log records allowed to queue before new ones are dropped.
    pub log_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_ttl: Duration::from_secs(3600),
            prediction_ttl: Duration::from_secs(300),
            store_timeout: Duration::from_millis(5000),
            invalidate_on_train: true,
            log_capacity: 1024,
        }
    }
}
