// Job discovery and registration.
//
// Job implementations self-register into a process-wide `HandlerRegistry`
// keyed by an identifier string; that identifier doubles as the row's
// job_class and is how the executor resolves the live instance at fire time.
// `JobRegistry` runs once at startup and brings the registration table, the
// database, and the ConfigStore into agreement for every entry.

use crate::configstore::ConfigClient;
use crate::db::repositories::JobRepository;
use crate::errors::{ExecutionError, SchedulerError, StorageError};
use crate::executor::JobContext;
use crate::models::{JobConfig, JobStatus, JobType};
use crate::reconciler::ConfigChange;
use crate::scheduler::SchedulerManager;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// A schedulable unit of work. Implementations are looked up by their
/// registration key; the context carries parameters and log appenders.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, ctx: &JobContext) -> Result<(), ExecutionError>;
}

/// Registration metadata describing how a job wants to be scheduled.
/// Supplied alongside the implementation when it registers; the database row
/// wins over these defaults once it exists.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_name: String,
    pub job_group: String,
    pub job_type: JobType,
    pub cron_expression: Option<String>,
    pub description: String,
    pub auto_start: bool,
    pub load_from_database: bool,
    /// None falls back to the process's active environment.
    pub environment: Option<String>,
}

impl JobSpec {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            job_group: crate::models::DEFAULT_JOB_GROUP.to_string(),
            job_type: JobType::Quartz,
            cron_expression: None,
            description: String::new(),
            auto_start: true,
            load_from_database: true,
            environment: None,
        }
    }

    pub fn group(mut self, job_group: impl Into<String>) -> Self {
        self.job_group = job_group.into();
        self
    }

    pub fn job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn load_from_database(mut self, load: bool) -> Self {
        self.load_from_database = load;
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

struct RegisteredJob {
    job: Arc<dyn Job>,
    spec: Option<JobSpec>,
}

/// Process-wide registration table mapping identifier strings to live job
/// instances. Registering the same key twice is detected and ignored.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: DashMap<String, RegisteredJob>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its identifier. Returns false (and
    /// keeps the first registration) when the key is already taken.
    pub fn register(&self, key: impl Into<String>, job: Arc<dyn Job>, spec: Option<JobSpec>) -> bool {
        let key = key.into();
        match self.entries.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(job_class = %key, "Duplicate job registration ignored");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(RegisteredJob { job, spec });
                true
            }
        }
    }

    /// Resolve a live instance by its identifier.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Job>> {
        self.entries.get(key).map(|entry| entry.value().job.clone())
    }

    /// Snapshot of (key, spec) pairs for the startup sweep.
    pub fn entries(&self) -> Vec<(String, Option<JobSpec>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().spec.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Startup registration sweep: for every registered implementation, merge
/// the registration spec with the database row, persist the result, publish
/// it to the ConfigStore, subscribe the reconciler to its document, and hand
/// running jobs to the scheduler.
pub struct JobRegistry {
    repository: Arc<dyn JobRepository>,
    config_client: Arc<ConfigClient>,
    scheduler: Arc<SchedulerManager>,
    handlers: Arc<HandlerRegistry>,
    environment: String,
    reconcile_tx: mpsc::UnboundedSender<ConfigChange>,
    synced: DashSet<String>,
}

impl JobRegistry {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        config_client: Arc<ConfigClient>,
        scheduler: Arc<SchedulerManager>,
        handlers: Arc<HandlerRegistry>,
        environment: impl Into<String>,
        reconcile_tx: mpsc::UnboundedSender<ConfigChange>,
    ) -> Self {
        Self {
            repository,
            config_client,
            scheduler,
            handlers,
            environment: environment.into(),
            reconcile_tx,
            synced: DashSet::new(),
        }
    }

    /// Run the registration sweep. Safe to call more than once: entries that
    /// already synced are skipped, and a failed entry never stops the sweep.
    #[instrument(skip(self))]
    pub async fn register_all(&self) {
        for (key, spec) in self.handlers.entries() {
            if !self.synced.insert(key.clone()) {
                debug!(job_class = %key, "Job already registered, skipping");
                continue;
            }
            if let Err(e) = self.register_one(&key, spec).await {
                warn!(job_class = %key, error = %e, "Job registration failed, skipping");
                // Leave the entry eligible for a later sweep.
                self.synced.remove(&key);
            }
        }
    }

    async fn register_one(&self, key: &str, spec: Option<JobSpec>) -> Result<(), StorageError> {
        // A spec-less registration synthesises one from the identifier:
        // name and group both the identifier, no cron, never auto-started.
        let spec = spec.unwrap_or_else(|| {
            JobSpec::new(key)
                .group(key)
                .auto_start(false)
                .description("auto-registered")
        });

        let environment = spec
            .environment
            .clone()
            .unwrap_or_else(|| self.environment.clone());

        let existing = if spec.load_from_database {
            self.repository
                .get_by_natural_key(&spec.job_name, &spec.job_group, &environment)
                .await?
        } else {
            None
        };

        let config = match existing {
            // The database row is authoritative; only the implementation
            // binding is refreshed if it diverged on disk.
            Some(mut row) => {
                if row.job_class != key {
                    info!(
                        job_name = %row.job_name,
                        old = %row.job_class,
                        new = %key,
                        "Rebinding job class to live implementation"
                    );
                    row.job_class = key.to_string();
                    row.modifier = "registry".to_string();
                    self.repository.update(row).await?
                } else {
                    row
                }
            }
            None => {
                let now = Utc::now();
                let fresh = JobConfig {
                    id: 0,
                    job_name: spec.job_name.clone(),
                    job_group: spec.job_group.clone(),
                    environment: environment.clone(),
                    job_type: spec.job_type,
                    job_class: key.to_string(),
                    cron_expression: spec.cron_expression.clone(),
                    job_params: serde_json::json!({}),
                    description: spec.description.clone(),
                    status: if spec.auto_start {
                        JobStatus::Running
                    } else {
                        JobStatus::Stopped
                    },
                    retry_count: 3,
                    retry_interval: 60,
                    timeout: 0,
                    alert_enabled: false,
                    alert_types: Vec::new(),
                    alert_receivers: Default::default(),
                    gray_release_enabled: false,
                    gray_release_percent: 100,
                    version: 0,
                    creator: "registry".to_string(),
                    modifier: "registry".to_string(),
                    create_time: now,
                    update_time: now,
                };
                self.repository.save(fresh).await?
            }
        };

        // Publish the effective configuration; the document becomes the
        // remote source of truth that operators edit.
        let data_id = config.data_id();
        match serde_json::to_string_pretty(&config) {
            Ok(document) => {
                let group = self.config_client.group().to_string();
                if !self
                    .config_client
                    .publish_config(&document, &data_id, &group)
                    .await
                {
                    warn!(data_id = %data_id, "Job document publish failed, continuing");
                }
            }
            Err(e) => warn!(data_id = %data_id, error = %e, "Job document serialization failed"),
        }

        // Subscribe the reconciler. The callback only enqueues; the
        // reconciliation worker does the actual work serially.
        let tx = self.reconcile_tx.clone();
        self.config_client
            .add_document_listener(
                &data_id,
                Arc::new(move |data_id, content| {
                    let _ = tx.send(ConfigChange {
                        data_id: data_id.to_string(),
                        content: content.to_string(),
                    });
                }),
            )
            .await;

        if spec.auto_start && config.status == JobStatus::Running {
            match self.scheduler.add_job(config.clone()) {
                Ok(()) => info!(
                    job_id = config.id,
                    job_name = %config.job_name,
                    "Job scheduled at startup"
                ),
                Err(SchedulerError::DuplicateJob(_)) => {
                    debug!(job_id = config.id, "Job already scheduled");
                }
                Err(e) => warn!(
                    job_id = config.id,
                    job_name = %config.job_name,
                    error = %e,
                    "Failed to schedule job at startup"
                ),
            }
        }

        info!(
            job_id = config.id,
            job_name = %config.job_name,
            job_group = %config.job_group,
            environment = %config.environment,
            status = %config.status,
            "Job registered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registry = HandlerRegistry::new();
        assert!(registry.register("a", Arc::new(NoopJob), None));
        assert!(!registry.register("a", Arc::new(NoopJob), None));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_spec_builder_defaults() {
        let spec = JobSpec::new("hello");
        assert_eq!(spec.job_group, "DEFAULT");
        assert_eq!(spec.job_type, JobType::Quartz);
        assert!(spec.auto_start);
        assert!(spec.load_from_database);
        assert!(spec.environment.is_none());

        let spec = JobSpec::new("hello")
            .group("G")
            .cron("0/5 * * * * ?")
            .auto_start(false)
            .environment("prod");
        assert_eq!(spec.job_group, "G");
        assert_eq!(spec.cron_expression.as_deref(), Some("0/5 * * * * ?"));
        assert!(!spec.auto_start);
        assert_eq!(spec.environment.as_deref(), Some("prod"));
    }

    #[test]
    fn test_lookup_by_key() {
        let registry = HandlerRegistry::new();
        registry.register("a", Arc::new(NoopJob), None);
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
    }
}
