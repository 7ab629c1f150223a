//! Request-level failures. Collaborator problems inside a prediction are not
//! errors; they become notes on the result.

use shuttle_axum::axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    /// No usable course cache yet (never refreshed, or refreshed to nothing).
    #[error("no historical course data; run a refresh first")]
    NoHistoricalData,
    #[error("course source failed: {0}")]
    Lms(#[source] anyhow::Error),
    #[error("course cache write failed: {0}")]
    Cache(#[source] anyhow::Error),
    /// The request's own task failed (panicked or was cancelled).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PredictError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::NoHistoricalData => "no_historical_data",
            PredictError::Lms(_) => "lms",
            PredictError::Cache(_) => "cache",
            PredictError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::NoHistoricalData => StatusCode::CONFLICT,
            PredictError::Lms(_) => StatusCode::BAD_GATEWAY,
            PredictError::Cache(_) | PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string(), "kind": self.kind() });
        (status, Json(body)).into_response()
    }
}
