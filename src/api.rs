use std::future::Future;
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::ai_adapter::ExplainRequest;
use crate::error::PredictError;
use crate::lms::types::CourseSummary;
use crate::orchestrator::{Explanation, PredictRequest, Predictor};
use crate::prediction::PredictionResult;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
}

impl AppState {
    pub fn new(predictor: Predictor) -> Self {
        Self {
            predictor: Arc::new(predictor),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/predict", post(predict))
        .route("/refresh", post(refresh_all))
        .route("/courses", get(list_courses))
        .route("/courses/{id}/refresh", post(refresh_course))
        .route("/explain", post(explain))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Run `work` on its own task so a panic becomes an `Internal` error response.
async fn isolated<T, F>(what: &'static str, work: F) -> Result<T, PredictError>
where
    F: Future<Output = Result<T, PredictError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(r) => r,
        Err(e) => Err(PredictError::Internal(format!("{what} aborted: {e}"))),
    }
}

async fn predict(
    State(state): State<AppState>,
    Json(body): Json<PredictRequest>,
) -> Result<Json<PredictionResult>, PredictError> {
    let predictor = Arc::clone(&state.predictor);
    isolated("prediction", async move { predictor.predict(body).await })
        .await
        .map(Json)
}

#[derive(serde::Serialize)]
struct RefreshOut {
    courses: Vec<CourseSummary>,
    failed: usize,
}

async fn refresh_all(State(state): State<AppState>) -> Result<Json<RefreshOut>, PredictError> {
    let predictor = Arc::clone(&state.predictor);
    let snap = isolated("refresh", async move { predictor.refresh_all().await }).await?;
    let failed = snap.iter().filter(|s| s.is_failed()).count();
    Ok(Json(RefreshOut {
        courses: snap.as_ref().clone(),
        failed,
    }))
}

async fn refresh_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CourseSummary>, PredictError> {
    let predictor = Arc::clone(&state.predictor);
    isolated("course refresh", async move { predictor.refresh_course(id).await })
        .await
        .map(Json)
}

/// Current cache; empty list when nothing has been refreshed yet.
async fn list_courses(State(state): State<AppState>) -> Json<Vec<CourseSummary>> {
    let rows = state
        .predictor
        .store()
        .snapshot()
        .map(|s| s.as_ref().clone())
        .unwrap_or_default();
    Json(rows)
}

async fn explain(
    State(state): State<AppState>,
    Json(body): Json<ExplainRequest>,
) -> Json<Explanation> {
    Json(state.predictor.explain(&body).await)
}
