use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::error::SqlState;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification callers branch on (and the HTTP layer maps to status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Infrastructure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Training input that cannot produce a usable model (too short, constant, non-finite).
    #[error("invalid training data: {0}")]
    InvalidTrainingData(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("model for series {0} not found, train it first")]
    ModelNotFound(String),

    #[error("{0} not found")]
    NotFound(String),

    /// `(series_id, version)` collided with a row committed concurrently.
    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache error: {0}")]
    Cache(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTrainingData(_) | Error::Validation(_) => ErrorKind::Validation,
            Error::ModelNotFound(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Storage(_) | Error::Timeout(_) | Error::Cache(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound)
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        let detail = match e.as_db_error() {
            Some(db) => db.message().to_string(),
            None => e.to_string(),
        };
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            Error::Conflict(detail)
        } else {
            Error::Storage(detail)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(format!("JSON column error: {e}"))
    }
}
