use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use sigmaguard::{TrainRequest, TrainResponse};

use super::{ApiResult, AppState};

/// POST /fit/{series_id}: train a new version from a sample
pub async fn fit(
    State(service): State<AppState>,
    Path(series_id): Path<String>,
    body: Result<Json<TrainRequest>, JsonRejection>,
) -> ApiResult<TrainResponse> {
    let Json(request) = body?;
    let response = service.train(&series_id, request).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::routes::tests::test_state;
    use axum::http::StatusCode;
    use sigmaguard::Version;

    #[tokio::test]
    async fn fit_returns_first_version() {
        let state = test_state();
        let body = TrainRequest::new(vec![100, 160, 220], vec![10.0, 10.2, 9.8]);
        let Json(resp) = fit(State(state), Path("s1".into()), Ok(Json(body)))
            .await
            .unwrap();
        assert_eq!(resp.series_id, "s1");
        assert_eq!(resp.version, Version::FIRST);
        assert_eq!(resp.points_used, 3);
    }

    #[tokio::test]
    async fn constant_series_is_unprocessable() {
        let state = test_state();
        let body = TrainRequest::new(vec![1, 2], vec![5.0, 5.0]);
        let err = fit(State(state.clone()), Path("s2".into()), Ok(Json(body)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.store().list_versions("s2").await.unwrap().is_empty());
    }
}
