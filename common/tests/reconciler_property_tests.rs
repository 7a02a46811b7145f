// Property-based tests for ConfigStore push reconciliation

use async_trait::async_trait;
use chrono::Utc;
use common::db::repositories::{InMemoryJobRepository, JobRepository};
use common::errors::ExecutionError;
use common::executor::{JobContext, JobExecutor};
use common::models::{AlertReceivers, JobConfig, JobStatus, JobType};
use common::reconciler::{spawn_reconcile_worker, ConfigChange, ConfigChangeReconciler};
use common::registry::{HandlerRegistry, Job};
use common::scheduler::{HandleState, SchedulerManager};
use std::sync::Arc;

struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    async fn execute(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
        Ok(())
    }
}

struct Harness {
    repository: Arc<InMemoryJobRepository>,
    scheduler: Arc<SchedulerManager>,
    reconciler: ConfigChangeReconciler,
}

fn harness() -> Harness {
    let repository = Arc::new(InMemoryJobRepository::new());
    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register("hello-job", Arc::new(NoopJob), None);
    let executor = Arc::new(JobExecutor::new(repository.clone(), handlers));
    let scheduler = Arc::new(SchedulerManager::new(executor));
    let reconciler = ConfigChangeReconciler::new(repository.clone(), scheduler.clone());

    Harness {
        repository,
        scheduler,
        reconciler,
    }
}

fn running_row() -> JobConfig {
    let now = Utc::now();
    JobConfig {
        id: 0,
        job_name: "hello".to_string(),
        job_group: "G".to_string(),
        environment: "dev".to_string(),
        job_type: JobType::Quartz,
        job_class: "hello-job".to_string(),
        cron_expression: Some("0/5 * * * * ?".to_string()),
        job_params: serde_json::json!({}),
        description: String::new(),
        status: JobStatus::Running,
        retry_count: 3,
        retry_interval: 60,
        timeout: 0,
        alert_enabled: false,
        alert_types: Vec::new(),
        alert_receivers: AlertReceivers::default(),
        gray_release_enabled: false,
        gray_release_percent: 100,
        version: 0,
        creator: "test".to_string(),
        modifier: "test".to_string(),
        create_time: now,
        update_time: now,
    }
}

const DATA_ID: &str = "scheduler.job.hello.G.dev.json";

async fn seed_scheduled(h: &Harness) -> JobConfig {
    let row = h.repository.save(running_row()).await.unwrap();
    h.scheduler.add_job(row.clone()).unwrap();
    row
}

/// A push changing only the cron expression updates the row, bumps version
/// by one, and reschedules the same job id on the new cadence.
#[tokio::test]
async fn property_cron_push_updates_row_and_handle() {
    let h = harness();
    let row = seed_scheduled(&h).await;

    h.reconciler
        .on_change(DATA_ID, r#"{"cronExpression": "0/10 * * * * ?"}"#)
        .await;

    let updated = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(updated.cron_expression.as_deref(), Some("0/10 * * * * ?"));
    assert_eq!(updated.version, row.version + 1);
    assert_eq!(updated.status, JobStatus::Running);

    let snapshot = h.scheduler.snapshot(row.id).expect("handle survives");
    assert_eq!(snapshot.cron_expression.as_deref(), Some("0/10 * * * * ?"));
    assert_eq!(h.scheduler.len(), 1);
}

/// A push flipping RUNNING to STOPPED updates the row and removes the
/// handle; no more fires.
#[tokio::test]
async fn property_stop_push_removes_handle() {
    let h = harness();
    let row = seed_scheduled(&h).await;

    h.reconciler
        .on_change(DATA_ID, r#"{"status": "STOPPED"}"#)
        .await;

    let updated = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Stopped);
    assert!(!h.scheduler.contains(row.id));
}

/// A push that changes neither status nor cron is a no-op on the scheduler:
/// the handle is not replaced.
#[tokio::test]
async fn property_unchanged_push_is_scheduler_noop() {
    let h = harness();
    let row = seed_scheduled(&h).await;
    let before = h.scheduler.snapshot(row.id).unwrap();

    h.reconciler
        .on_change(
            DATA_ID,
            r#"{"status": "RUNNING", "cronExpression": "0/5 * * * * ?", "description": "only text"}"#,
        )
        .await;

    let updated = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(updated.description, "only text");
    assert_eq!(updated.version, row.version + 1);

    let after = h.scheduler.snapshot(row.id).unwrap();
    assert!(Arc::ptr_eq(&before, &after), "handle must not be replaced");
}

/// Changing only jobParams updates the row but leaves the handle alone too;
/// rescheduling is reserved for cron changes.
#[tokio::test]
async fn property_params_only_push_is_scheduler_noop() {
    let h = harness();
    let row = seed_scheduled(&h).await;
    let before = h.scheduler.snapshot(row.id).unwrap();

    h.reconciler
        .on_change(DATA_ID, r#"{"jobParams": {"limit": 250}}"#)
        .await;

    let updated = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(updated.job_params, serde_json::json!({"limit": 250}));
    assert_eq!(updated.version, row.version + 1);
    assert_eq!(updated.status, JobStatus::Running);

    let after = h.scheduler.snapshot(row.id).unwrap();
    assert!(Arc::ptr_eq(&before, &after), "handle must not be replaced");
}

/// A push for an unknown natural key creates the row from the document and
/// schedules it when it arrives RUNNING.
#[tokio::test]
async fn property_push_creates_missing_row() {
    let h = harness();

    h.reconciler
        .on_change(
            DATA_ID,
            r#"{
                "jobType": "QUARTZ",
                "jobClass": "hello-job",
                "cronExpression": "0/5 * * * * ?",
                "status": "RUNNING"
            }"#,
        )
        .await;

    let row = h
        .repository
        .get_by_natural_key("hello", "G", "dev")
        .await
        .unwrap()
        .expect("row created from document");
    assert_eq!(row.version, 1);
    assert_eq!(row.retry_count, 3);
    assert!(h.scheduler.contains(row.id));
}

/// Malformed data ids and documents are discarded without touching state.
#[tokio::test]
async fn property_malformed_pushes_discarded() {
    let h = harness();
    let row = seed_scheduled(&h).await;

    h.reconciler
        .on_change("scheduler.job.not-enough-parts.json", r#"{"status": "STOPPED"}"#)
        .await;
    h.reconciler.on_change(DATA_ID, "{definitely not json").await;
    h.reconciler.on_change(DATA_ID, "").await;

    let unchanged = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(unchanged.version, row.version);
    assert_eq!(unchanged.status, JobStatus::Running);
    assert!(h.scheduler.contains(row.id));
}

/// A document missing required creation keys cannot create a row.
#[tokio::test]
async fn property_incomplete_document_cannot_create() {
    let h = harness();

    h.reconciler
        .on_change(DATA_ID, r#"{"cronExpression": "0/5 * * * * ?"}"#)
        .await;

    let row = h
        .repository
        .get_by_natural_key("hello", "G", "dev")
        .await
        .unwrap();
    assert!(row.is_none());
}

/// PAUSED to RUNNING resumes the existing handle in place rather than
/// adding a duplicate.
#[tokio::test]
async fn property_paused_to_running_resumes_handle() {
    let h = harness();
    let row = seed_scheduled(&h).await;

    h.reconciler
        .on_change(DATA_ID, r#"{"status": "PAUSED"}"#)
        .await;
    assert_eq!(h.scheduler.handle_state(row.id), Some(HandleState::Paused));

    h.reconciler
        .on_change(DATA_ID, r#"{"status": "RUNNING"}"#)
        .await;
    assert_eq!(h.scheduler.handle_state(row.id), Some(HandleState::Started));
    assert_eq!(h.scheduler.len(), 1);
}

/// Two pushes for the same data id are applied in receive order when routed
/// through the serial worker.
#[tokio::test]
async fn property_pushes_processed_in_receive_order() {
    let h = harness();
    let row = seed_scheduled(&h).await;

    let reconciler = Arc::new(ConfigChangeReconciler::new(
        h.repository.clone(),
        h.scheduler.clone(),
    ));
    let (tx, _worker) = spawn_reconcile_worker(reconciler);

    tx.send(ConfigChange {
        data_id: DATA_ID.to_string(),
        content: r#"{"cronExpression": "0/10 * * * * ?"}"#.to_string(),
    })
    .unwrap();
    tx.send(ConfigChange {
        data_id: DATA_ID.to_string(),
        content: r#"{"cronExpression": "0/30 * * * * ?"}"#.to_string(),
    })
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let updated = h.repository.get_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(updated.cron_expression.as_deref(), Some("0/30 * * * * ?"));
    assert_eq!(updated.version, row.version + 2);
}
