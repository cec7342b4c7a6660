//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, RecordQuery, SummaryResponse};

/// `GET /summary` → 200 + `SummaryResponse` JSON
pub async fn get_summary(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    Json(SummaryResponse {
        config: state.config.clone(),
        summary: state.summary.clone(),
        steps_recorded: state.record.len(),
    })
}

/// Returns step results, optionally filtered by step range.
///
/// `GET /record` → every step
/// `GET /record?from=N&to=M` → inclusive range
/// `GET /record?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    Ok(Json(state.record.range(from, to).to_vec()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, NaiveDate};
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::forecast::SeriesForecast;
    use crate::sim::controller::RollingController;
    use crate::sim::cost::CostSummary;
    use crate::sim::program::LinearProgram;
    use crate::sim::solver::{SolveOutcome, Solver};
    use crate::sim::types::{DispatchConfig, SolveStatus};
    use crate::error::SolverError;

    struct Infeasible;

    impl Solver for Infeasible {
        fn solve(
            &self,
            _: &LinearProgram,
            _: std::time::Duration,
        ) -> Result<SolveOutcome, SolverError> {
            Ok(SolveOutcome::without_values(
                SolveStatus::Infeasible,
                std::time::Duration::ZERO,
            ))
        }
    }

    fn make_test_state() -> Arc<AppState> {
        let config = DispatchConfig {
            total_steps: 24,
            horizon: 4,
            ..DispatchConfig::default()
        };
        let start = NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let forecast =
            SeriesForecast::constant(start, Duration::minutes(30), 24, 50.0, 0.0, 10.0).unwrap();
        let mut controller = RollingController::new(config.clone(), forecast, Infeasible).unwrap();
        controller.run().unwrap();
        let record = controller.into_record();
        let summary = CostSummary::from_record(record.as_slice(), &config);
        Arc::new(AppState {
            config,
            summary,
            record,
        })
    }

    async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn summary_returns_200() {
        let (status, json) = get("/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["steps_recorded"], 24);
        assert_eq!(json["summary"]["peak_purchase_kw"], 50.0);
        assert_eq!(json["config"]["horizon"], 4);
    }

    #[tokio::test]
    async fn record_range_is_inclusive() {
        let (status, json) = get("/record?from=10&to=15").await;
        assert_eq!(status, StatusCode::OK);
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0]["step"], 10);
        assert_eq!(rows[5]["step"], 15);
    }

    #[tokio::test]
    async fn inverted_range_returns_400() {
        let (status, json) = get("/record?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("must be <="));
    }
}
