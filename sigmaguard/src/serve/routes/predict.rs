use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use sigmaguard::{PredictRequest, PredictResponse, Version};

use super::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    /// Pin a version (`v3`); the active one when absent.
    pub version: Option<String>,
}

/// POST /predict/{series_id}: classify one point
pub async fn predict(
    State(service): State<AppState>,
    Path(series_id): Path<String>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<PredictResponse> {
    let Query(query) = query?;
    let Json(request) = body?;
    let version = query
        .version
        .as_deref()
        .map(str::parse::<Version>)
        .transpose()?;
    let response = service.predict(&series_id, version, request).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::routes::tests::test_state;
    use axum::http::StatusCode;
    use sigmaguard::{TrainRequest, Timestamp};

    async fn trained() -> AppState {
        let state = test_state();
        state
            .train("s1", TrainRequest::new(vec![100, 160, 220], vec![10.0, 10.2, 9.8]))
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn spike_is_anomalous() {
        let state = trained().await;
        let body = PredictRequest {
            timestamp: Timestamp::Text("300".into()),
            value: 15.0,
        };
        let Json(resp) = predict(
            State(state),
            Path("s1".into()),
            Ok(Query(PredictQuery::default())),
            Ok(Json(body)),
        )
        .await
        .unwrap();
        assert!(resp.anomaly);
        assert_eq!(resp.model_version, Version::FIRST);
    }

    #[tokio::test]
    async fn untrained_series_is_not_found() {
        let state = test_state();
        let err = predict(
            State(state),
            Path("unknown_series".into()),
            Ok(Query(PredictQuery::default())),
            Ok(Json(PredictRequest::new(1, 1.0))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_inputs_are_unprocessable() {
        let state = trained().await;
        let err = predict(
            State(state.clone()),
            Path("s1".into()),
            Ok(Query(PredictQuery { version: Some("latest-ish".into()) })),
            Ok(Json(PredictRequest::new(1, 1.0))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = PredictRequest {
            timestamp: Timestamp::Text("yesterday".into()),
            value: 10.0,
        };
        let err = predict(
            State(state),
            Path("s1".into()),
            Ok(Query(PredictQuery::default())),
            Ok(Json(body)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn pinned_version_must_exist() {
        let state = trained().await;
        let err = predict(
            State(state),
            Path("s1".into()),
            Ok(Query(PredictQuery { version: Some("v7".into()) })),
            Ok(Json(PredictRequest::new(1, 10.0))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
