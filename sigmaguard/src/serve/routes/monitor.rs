use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sigmaguard::monitor::HealthStatus;
use sigmaguard::{HealthReport, ModelList, PlotResponse, VersionRef};

use super::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct PlotQuery {
    pub series_id: String,
    /// `vN` or `latest`; the active version when absent.
    pub version: Option<String>,
}

/// GET /plot?series_id=..&version=..: a version's training sample, scored
pub async fn plot(
    State(service): State<AppState>,
    query: Result<Query<PlotQuery>, QueryRejection>,
) -> ApiResult<PlotResponse> {
    let Query(query) = query?;
    let version = match query.version.as_deref() {
        Some(v) => v.parse::<VersionRef>()?,
        None => VersionRef::Latest,
    };
    let plot = service.monitor().plot(&query.series_id, version).await?;
    Ok(Json(plot))
}

/// GET /models/{series_id}: every version of a series
pub async fn models(
    State(service): State<AppState>,
    Path(series_id): Path<String>,
) -> ApiResult<ModelList> {
    let list = service.monitor().list_models(&series_id).await?;
    Ok(Json(list))
}

/// GET /healthcheck
pub async fn healthcheck(State(service): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = service.monitor().health().await;
    let status = match report.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::routes::tests::test_state;
    use sigmaguard::{TrainRequest, Version};

    #[tokio::test]
    async fn health_is_ok_for_memory_store() {
        let state = test_state();
        let (status, Json(report)) = healthcheck(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report.store_connected);
        assert_eq!(report.series_trained, 0);
    }

    #[tokio::test]
    async fn plot_defaults_to_active_version() {
        let state = test_state();
        for values in [vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]] {
            state
                .train("s1", TrainRequest::new(vec![1, 2, 3], values))
                .await
                .unwrap();
        }

        let query = PlotQuery {
            series_id: "s1".into(),
            version: None,
        };
        let Json(latest) = plot(State(state.clone()), Ok(Query(query))).await.unwrap();
        assert_eq!(latest.model_version.number(), 2);
        assert_eq!(latest.summary.total_points, 3);

        let query = PlotQuery {
            series_id: "s1".into(),
            version: Some("v1".into()),
        };
        let Json(first) = plot(State(state), Ok(Query(query))).await.unwrap();
        assert_eq!(first.model_version, Version::FIRST);
        assert_eq!(first.data_points[2].value, 3.0);
    }

    #[tokio::test]
    async fn unknown_series_has_no_models() {
        let state = test_state();
        let err = models(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
