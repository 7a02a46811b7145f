use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::handlers::{ApiError, ApiResponse};
use crate::state::AppState;
use common::models::{JobConfig, JobDocument, JobStatus, JobType, LogStatus, DEFAULT_JOB_GROUP};
use common::reconciler::apply_scheduler_transition;
use common::scheduler::validate_cron;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub environment: Option<String>,
    pub status: Option<String>,
}

/// List job configurations, optionally filtered by environment and status.
#[tracing::instrument(skip(state))]
pub async fn list_configs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<JobConfig>>, ApiError> {
    let environment = query.environment.as_deref();

    let configs = match query.status.as_deref() {
        Some(raw) => {
            let status: JobStatus = raw
                .parse()
                .map_err(|e| ApiError::validation("status", e))?;
            state.repository.list_by_status(status, environment).await?
        }
        None => state.repository.list_all(environment).await?,
    };

    Ok(ApiResponse::ok(configs))
}

/// Fetch one job configuration.
#[tracing::instrument(skip(state))]
pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    let config = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job config", id))?;
    Ok(ApiResponse::ok(config))
}

/// Create a job configuration from a document body. Missing jobGroup,
/// environment, jobType, jobClass and status take their defaults; the row is
/// scheduled immediately when created in RUNNING state.
#[tracing::instrument(skip(state, document))]
pub async fn create_config(
    State(state): State<AppState>,
    Json(mut document): Json<JobDocument>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    let job_name = document
        .job_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::validation("jobName", "must not be empty"))?;

    if let Some(expression) = document.cron_expression.as_deref() {
        validate_cron(expression).map_err(|e| ApiError::validation("cronExpression", e))?;
    }

    document
        .job_group
        .get_or_insert_with(|| DEFAULT_JOB_GROUP.to_string());
    document
        .environment
        .get_or_insert_with(|| state.environment.clone());
    document.job_type.get_or_insert_with(Default::default);
    document.job_class.get_or_insert_with(|| job_name.clone());
    document.status.get_or_insert(JobStatus::Stopped);

    let mut config = document.into_new_config()?;

    if config.status == JobStatus::Running
        && config.job_type == JobType::Quartz
        && config.cron_expression.is_none()
    {
        return Err(ApiError::validation(
            "cronExpression",
            "required for a running QUARTZ job",
        ));
    }

    let duplicate = state
        .repository
        .get_by_natural_key(&config.job_name, &config.job_group, &config.environment)
        .await?;
    if duplicate.is_some() {
        return Err(ApiError::new(format!(
            "job ({}, {}, {}) already exists",
            config.job_name, config.job_group, config.environment
        )));
    }

    config.creator = "api".to_string();
    config.modifier = "api".to_string();
    let saved = state.repository.save(config).await?;

    if saved.status == JobStatus::Running {
        state.scheduler.add_job(saved.clone())?;
    }

    tracing::info!(job_id = saved.id, job_name = %saved.job_name, "Job config created");
    Ok(ApiResponse::ok(saved))
}

/// Overlay document fields onto an existing row and push the resulting
/// transition into the scheduler.
#[tracing::instrument(skip(state, document))]
pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(document): Json<JobDocument>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    if let Some(expression) = document.cron_expression.as_deref() {
        validate_cron(expression).map_err(|e| ApiError::validation("cronExpression", e))?;
    }

    let current = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job config", id))?;

    let old_status = current.status;
    let old_cron = current.cron_expression.clone();

    let mut next = current;
    document.overlay(&mut next);
    next.modifier = "api".to_string();

    let updated = state.repository.update(next).await?;
    apply_scheduler_transition(&state.scheduler, old_status, &old_cron, &updated);

    tracing::info!(job_id = updated.id, version = updated.version, "Job config updated");
    Ok(ApiResponse::ok(updated))
}

/// Delete a row and drop its handle.
#[tracing::instrument(skip(state))]
pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<i64>, ApiError> {
    let deleted = state.repository.delete(id).await?;
    if !deleted {
        return Err(ApiError::not_found("job config", id));
    }

    state.scheduler.remove_job(id);
    tracing::info!(job_id = id, "Job config deleted");
    Ok(ApiResponse::ok(id))
}

#[derive(Debug, Clone, Copy)]
enum LifecycleAction {
    Start,
    Stop,
    Pause,
    Resume,
}

impl LifecycleAction {
    fn target_status(self) -> JobStatus {
        match self {
            LifecycleAction::Start | LifecycleAction::Resume => JobStatus::Running,
            LifecycleAction::Stop => JobStatus::Stopped,
            LifecycleAction::Pause => JobStatus::Paused,
        }
    }
}

/// Shared status-transition handler: persist the target status, then mirror
/// the reconciler's mapping onto the scheduler.
async fn change_status(
    state: &AppState,
    id: i64,
    action: LifecycleAction,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    let current = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job config", id))?;

    let old_status = current.status;
    let old_cron = current.cron_expression.clone();

    let mut next = current;
    next.status = action.target_status();
    next.modifier = "api".to_string();

    let updated = state.repository.update(next).await?;
    apply_scheduler_transition(&state.scheduler, old_status, &old_cron, &updated);

    tracing::info!(job_id = id, status = %updated.status, "Job status changed");
    Ok(ApiResponse::ok(updated))
}

#[tracing::instrument(skip(state))]
pub async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    change_status(&state, id, LifecycleAction::Start).await
}

#[tracing::instrument(skip(state))]
pub async fn stop_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    change_status(&state, id, LifecycleAction::Stop).await
}

#[tracing::instrument(skip(state))]
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    change_status(&state, id, LifecycleAction::Pause).await
}

#[tracing::instrument(skip(state))]
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<JobConfig>, ApiError> {
    change_status(&state, id, LifecycleAction::Resume).await
}

/// Response of an ad-hoc run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub job_id: i64,
    pub job_name: String,
}

/// Run the job once, synchronously on the request task.
#[tracing::instrument(skip(state))]
pub async fn execute_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<ExecuteResponse>, ApiError> {
    let config = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job config", id))?;

    let outcome = state.executor.execute(&config).await;

    Ok(ApiResponse::ok(ExecuteResponse {
        success: outcome.success,
        error_message: outcome.error_message,
        job_id: config.id,
        job_name: config.job_name,
    }))
}

/// Execution statistics over the most recent (at most 100) logs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub total_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub success_rate: f64,
    pub avg_duration: f64,
    pub status: JobStatus,
}

#[tracing::instrument(skip(state))]
pub async fn job_statistics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<StatisticsResponse>, ApiError> {
    let config = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("job config", id))?;

    let logs = state.repository.list_logs_by_job_id(id, 100).await?;

    let total_count = logs.len() as i64;
    let success_count = logs.iter().filter(|l| l.status == LogStatus::Success).count() as i64;
    let failed_count = logs.iter().filter(|l| l.status == LogStatus::Failed).count() as i64;

    let success_rate = if total_count == 0 {
        0.0
    } else {
        success_count as f64 * 100.0 / total_count as f64
    };

    let durations: Vec<i64> = logs.iter().filter_map(|l| l.duration).collect();
    let avg_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };

    Ok(ApiResponse::ok(StatisticsResponse {
        total_count,
        success_count,
        failed_count,
        success_rate,
        avg_duration,
        status: config.status,
    }))
}
