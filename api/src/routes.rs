use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Job configuration management
        .route("/job/config/list", get(handlers::jobs::list_configs))
        .route("/job/config", post(handlers::jobs::create_config))
        .route("/job/config/:id", get(handlers::jobs::get_config))
        .route("/job/config/:id", put(handlers::jobs::update_config))
        .route("/job/config/:id", delete(handlers::jobs::delete_config))
        // Lifecycle control
        .route("/job/:id/start", post(handlers::jobs::start_job))
        .route("/job/:id/stop", post(handlers::jobs::stop_job))
        .route("/job/:id/pause", post(handlers::jobs::pause_job))
        .route("/job/:id/resume", post(handlers::jobs::resume_job))
        // Ad-hoc execution
        .route("/job/:id/execute", post(handlers::jobs::execute_job))
        // Execution history and statistics
        .route("/job/:id/logs", get(handlers::logs::list_job_logs))
        .route("/job/log/:log_id", get(handlers::logs::get_log))
        .route(
            "/job/log/execution/:execution_id",
            get(handlers::logs::get_log_by_execution),
        )
        .route("/job/:id/statistics", get(handlers::jobs::job_statistics))
        // Operational endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
