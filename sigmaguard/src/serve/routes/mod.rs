pub mod fit;
pub mod monitor;
pub mod predict;

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sigmaguard::{Error, ErrorKind, Service};

pub type AppState = Arc<Service>;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the application router with all API routes.
pub fn build_router(service: AppState) -> Router {
    Router::new()
        .route("/fit/{series_id}", post(fit::fit))
        .route("/predict/{series_id}", post(predict::predict))
        .route("/plot", get(monitor::plot))
        .route("/models/{series_id}", get(monitor::models))
        .route("/healthcheck", get(monitor::healthcheck))
        .with_state(service)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_type: ErrorKind,
}

/// A core error rendered as `{"detail", "error_type"}` with a status matching its kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.kind()) {
            (Error::Timeout(_), _) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorKind::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
            (_, ErrorKind::Infrastructure) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(Error::Validation(e.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError(Error::Validation(e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_client_error() {
            tracing::debug!("request rejected: {}", self.0);
        } else {
            tracing::error!("request failed: {}", self.0);
        }
        let body = ErrorBody {
            detail: self.0.to_string(),
            error_type: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    use sigmaguard::ServiceConfig;

    pub(crate) fn test_state() -> AppState {
        Arc::new(Service::in_memory(ServiceConfig::default()))
    }

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (Error::InvalidTrainingData("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::ModelNotFound("s1".into()), StatusCode::NOT_FOUND),
            (Error::Conflict("dup".into()), StatusCode::CONFLICT),
            (Error::Storage("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Timeout(Duration::from_secs(5)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn only_client_errors_map_to_validation_or_not_found_statuses() {
        let cases = [
            Error::Validation("x".into()),
            Error::NotFound("v9".into()),
            Error::Conflict("dup".into()),
            Error::Cache("down".into()),
            Error::Timeout(Duration::from_secs(1)),
        ];
        for err in cases {
            let client = err.is_client_error();
            let status = ApiError(err).status();
            assert_eq!(
                client,
                status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::NOT_FOUND,
                "{status}"
            );
        }
    }

    #[test]
    fn error_body_names_the_kind() {
        let body = ErrorBody {
            detail: Error::ModelNotFound("s1".into()).to_string(),
            error_type: ErrorKind::NotFound,
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["error_type"], "not_found");
        assert_eq!(json["detail"], "model for series s1 not found, train it first");
    }

    #[tokio::test]
    async fn router_builds_with_service_state() {
        let _router = build_router(test_state());
    }
}
