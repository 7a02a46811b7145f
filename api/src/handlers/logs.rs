use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::handlers::{ApiError, ApiResponse};
use crate::state::AppState;
use common::models::JobLog;

const DEFAULT_LOG_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

/// Most recent execution logs for a job, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_job_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<ApiResponse<Vec<JobLog>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if limit <= 0 {
        return Err(ApiError::validation("limit", "must be positive"));
    }

    let logs = state.repository.list_logs_by_job_id(id, limit).await?;
    Ok(ApiResponse::ok(logs))
}

/// Log detail by row id.
#[tracing::instrument(skip(state))]
pub async fn get_log(
    State(state): State<AppState>,
    Path(log_id): Path<i64>,
) -> Result<ApiResponse<JobLog>, ApiError> {
    let log = state
        .repository
        .get_log_by_id(log_id)
        .await?
        .ok_or_else(|| ApiError::not_found("job log", log_id))?;
    Ok(ApiResponse::ok(log))
}

/// Log detail by execution id.
#[tracing::instrument(skip(state))]
pub async fn get_log_by_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<ApiResponse<JobLog>, ApiError> {
    let log = state
        .repository
        .get_log_by_execution_id(&execution_id)
        .await?
        .ok_or_else(|| ApiError::not_found("job log for execution", &execution_id))?;
    Ok(ApiResponse::ok(log))
}
