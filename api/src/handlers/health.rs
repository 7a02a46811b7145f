use axum::extract::State;
use serde::Serialize;

use crate::handlers::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub scheduled_jobs: usize,
}

/// Liveness endpoint.
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthResponse> {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        environment: state.environment.clone(),
        scheduled_jobs: state.scheduler.len(),
    })
}
