// Scheduler: the live set of scheduled jobs and their trigger bindings.

pub mod handle;
pub mod trigger;

pub use handle::{HandleState, JobHandle};
pub use trigger::{
    validate_cron, CronTriggerEngine, ExternalJobBridge, FireCallback, TriggerBinding,
    TriggerEngine,
};

use crate::errors::SchedulerError;
use crate::executor::JobExecutor;
use crate::models::JobConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Owns the concurrent map `job_id → handle` and applies lifecycle
/// operations under a stable identity. Operations on distinct job ids are
/// independent; per-id operations are serialized by the map's entry locking,
/// which is what makes `update_job`'s stop-then-add atomic.
pub struct SchedulerManager {
    handles: DashMap<i64, Arc<JobHandle>>,
    executor: Arc<JobExecutor>,
    engine: Option<Arc<dyn TriggerEngine>>,
    bridge: Option<Arc<dyn ExternalJobBridge>>,
}

impl SchedulerManager {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self {
            handles: DashMap::new(),
            executor,
            engine: None,
            bridge: None,
        }
    }

    /// Wire in a trigger engine; Quartz handles without one degrade to
    /// self-scheduled cooperative loops.
    pub fn with_engine(mut self, engine: Arc<dyn TriggerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Wire in the external executor bridge for External jobs.
    pub fn with_external_bridge(mut self, bridge: Arc<dyn ExternalJobBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Instantiate and start a handle for the configuration. Fails with
    /// `SchedulerError::DuplicateJob` when the job id is already live.
    #[instrument(skip(self, config), fields(job_id = config.id, job_name = %config.job_name))]
    pub fn add_job(&self, config: JobConfig) -> Result<(), SchedulerError> {
        match self.handles.entry(config.id) {
            Entry::Occupied(_) => Err(SchedulerError::DuplicateJob(config.id)),
            Entry::Vacant(slot) => {
                let handle = Arc::new(JobHandle::new(config));
                handle.start(
                    self.executor.clone(),
                    self.engine.as_ref(),
                    self.bridge.as_ref(),
                )?;
                info!("Job scheduled");
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Atomically replace the handle under the same job id: the old handle
    /// is stopped and removed, then a fresh one is started with the new
    /// snapshot. A fire in progress completes under the old snapshot; the
    /// next fire uses the new one.
    #[instrument(skip(self, config), fields(job_id = config.id, job_name = %config.job_name))]
    pub fn update_job(&self, config: JobConfig) -> Result<(), SchedulerError> {
        match self.handles.entry(config.id) {
            Entry::Occupied(mut slot) => {
                slot.get().stop(self.engine.as_ref(), self.bridge.as_ref());
                let handle = Arc::new(JobHandle::new(config));
                match handle.start(
                    self.executor.clone(),
                    self.engine.as_ref(),
                    self.bridge.as_ref(),
                ) {
                    Ok(()) => {
                        info!("Job rescheduled with new configuration");
                        slot.insert(handle);
                        Ok(())
                    }
                    Err(e) => {
                        // The old handle is already stopped; a dead entry
                        // must not shadow a future add.
                        slot.remove();
                        Err(e)
                    }
                }
            }
            Entry::Vacant(slot) => {
                let handle = Arc::new(JobHandle::new(config));
                handle.start(
                    self.executor.clone(),
                    self.engine.as_ref(),
                    self.bridge.as_ref(),
                )?;
                info!("Job scheduled");
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Stop and drop the handle. Idempotent; in-flight fires finish.
    #[instrument(skip(self))]
    pub fn remove_job(&self, job_id: i64) {
        if let Some((_, handle)) = self.handles.remove(&job_id) {
            handle.stop(self.engine.as_ref(), self.bridge.as_ref());
            info!("Job unscheduled");
        } else {
            debug!("No handle to remove");
        }
    }

    /// Pause firing. Silent no-op without a handle.
    #[instrument(skip(self))]
    pub fn pause_job(&self, job_id: i64) {
        if let Some(handle) = self.handles.get(&job_id) {
            match handle.pause(self.engine.as_ref()) {
                Ok(()) => info!("Job paused"),
                Err(e) => warn!(error = %e, "Pause skipped"),
            }
        } else {
            debug!("No handle to pause");
        }
    }

    /// Resume firing. Silent no-op without a handle.
    #[instrument(skip(self))]
    pub fn resume_job(&self, job_id: i64) {
        if let Some(handle) = self.handles.get(&job_id) {
            match handle.resume(self.engine.as_ref()) {
                Ok(()) => info!("Job resumed"),
                Err(e) => warn!(error = %e, "Resume skipped"),
            }
        } else {
            debug!("No handle to resume");
        }
    }

    pub fn contains(&self, job_id: i64) -> bool {
        self.handles.contains_key(&job_id)
    }

    pub fn handle_state(&self, job_id: i64) -> Option<HandleState> {
        self.handles.get(&job_id).map(|handle| handle.state())
    }

    /// Configuration snapshot a job currently fires with.
    pub fn snapshot(&self, job_id: i64) -> Option<Arc<JobConfig>> {
        self.handles.get(&job_id).map(|handle| handle.config())
    }

    pub fn job_ids(&self) -> Vec<i64> {
        self.handles.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every handle. In-flight fires are allowed to finish; retry
    /// sleeps are interrupted through the executor's shutdown token, which
    /// the host cancels separately.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let job_ids = self.job_ids();
        for job_id in job_ids {
            self.remove_job(job_id);
        }
        info!("Scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::InMemoryJobRepository;
    use crate::models::{AlertReceivers, JobStatus, JobType};
    use crate::registry::HandlerRegistry;
    use chrono::Utc;

    fn config(id: i64, cron: &str) -> JobConfig {
        JobConfig {
            id,
            job_name: format!("job-{}", id),
            job_group: "DEFAULT".to_string(),
            environment: "dev".to_string(),
            job_type: JobType::Quartz,
            job_class: format!("job-{}", id),
            cron_expression: Some(cron.to_string()),
            job_params: serde_json::json!({}),
            description: String::new(),
            status: JobStatus::Running,
            retry_count: 0,
            retry_interval: 0,
            timeout: 0,
            alert_enabled: false,
            alert_types: Vec::new(),
            alert_receivers: AlertReceivers::default(),
            gray_release_enabled: false,
            gray_release_percent: 100,
            version: 1,
            creator: String::new(),
            modifier: String::new(),
            create_time: Utc::now(),
            update_time: Utc::now(),
        }
    }

    fn manager() -> SchedulerManager {
        let executor = Arc::new(JobExecutor::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(HandlerRegistry::new()),
        ));
        SchedulerManager::new(executor)
    }

    #[tokio::test]
    async fn test_add_then_duplicate_rejected() {
        let manager = manager();
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();
        let err = manager.add_job(config(1, "0 0 12 * * ?")).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob(1)));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_update_preserves_identity_and_swaps_snapshot() {
        let manager = manager();
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();

        let mut updated = config(1, "0 0 6 * * ?");
        updated.version = 2;
        manager.update_job(updated).unwrap();

        assert_eq!(manager.len(), 1);
        let snapshot = manager.snapshot(1).unwrap();
        assert_eq!(snapshot.cron_expression.as_deref(), Some("0 0 6 * * ?"));
        assert_eq!(manager.handle_state(1), Some(HandleState::Started));
    }

    #[tokio::test]
    async fn test_remove_pause_resume_are_idempotent_without_handle() {
        let manager = manager();
        manager.remove_job(99);
        manager.pause_job(99);
        manager.resume_job(99);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_start_leaves_one_handle() {
        let manager = manager();
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();
        manager.remove_job(1);
        assert!(!manager.contains(1));
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.handle_state(1), Some(HandleState::Started));
    }

    #[tokio::test]
    async fn test_failed_update_does_not_shadow_future_add() {
        let manager = manager();
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();

        let err = manager.update_job(config(1, "garbage")).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCronExpression { .. }));
        assert!(!manager.contains(1));

        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();
        assert_eq!(manager.handle_state(1), Some(HandleState::Started));
    }

    #[tokio::test]
    async fn test_invalid_cron_add_fails_and_leaves_no_handle() {
        let manager = manager();
        let err = manager.add_job(config(1, "*/5 * * * *")).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCronExpression { .. }));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_clears_all_handles() {
        let manager = manager();
        manager.add_job(config(1, "0 0 12 * * ?")).unwrap();
        manager.add_job(config(2, "0 0 12 * * ?")).unwrap();
        manager.shutdown();
        assert!(manager.is_empty());
    }
}
