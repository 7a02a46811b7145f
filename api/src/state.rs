use std::sync::Arc;

use common::db::repositories::JobRepository;
use common::executor::JobExecutor;
use common::scheduler::SchedulerManager;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn JobRepository>,
    pub scheduler: Arc<SchedulerManager>,
    pub executor: Arc<JobExecutor>,
    /// Default environment tag applied to rows created without one.
    pub environment: String,
    /// None when the metrics recorder is not installed (tests).
    pub metrics: Option<PrometheusHandle>,
}

// Manual Debug implementation for cleaner output
impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("repository", &"<Arc<dyn JobRepository>>")
            .field("scheduler", &"<Arc<SchedulerManager>>")
            .field("executor", &"<Arc<JobExecutor>>")
            .field("environment", &self.environment)
            .finish()
    }
}
