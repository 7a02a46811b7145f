// Property-based tests for the job executor

use async_trait::async_trait;
use chrono::Utc;
use common::db::repositories::{InMemoryJobRepository, JobRepository};
use common::errors::ExecutionError;
use common::executor::{gray_admits, JobContext, JobExecutor};
use common::models::{AlertReceivers, JobConfig, JobStatus, JobType, LogStatus};
use common::registry::{HandlerRegistry, Job};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// Mock implementations for testing

/// Job that always fails, counting its invocations.
struct FailingJob {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for FailingJob {
    async fn execute(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(ExecutionError::JobFailed("always fails".to_string()))
    }
}

/// Job that always succeeds, counting its invocations.
struct CountingJob {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for CountingJob {
    async fn execute(&self, ctx: &JobContext) -> Result<(), ExecutionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        ctx.log("did some work");
        Ok(())
    }
}

fn job_config(job_class: &str, retry_count: i32, retry_interval: i32) -> JobConfig {
    JobConfig {
        id: 1,
        job_name: "test-job".to_string(),
        job_group: "DEFAULT".to_string(),
        environment: "dev".to_string(),
        job_type: JobType::Quartz,
        job_class: job_class.to_string(),
        cron_expression: Some("0/5 * * * * ?".to_string()),
        job_params: serde_json::json!({"limit": 5}),
        description: String::new(),
        status: JobStatus::Running,
        retry_count,
        retry_interval,
        timeout: 0,
        alert_enabled: false,
        alert_types: Vec::new(),
        alert_receivers: AlertReceivers::default(),
        gray_release_enabled: false,
        gray_release_percent: 100,
        version: 1,
        creator: "test".to_string(),
        modifier: "test".to_string(),
        create_time: Utc::now(),
        update_time: Utc::now(),
    }
}

fn harness(job_class: &str, job: Arc<dyn Job>) -> (Arc<InMemoryJobRepository>, JobExecutor) {
    let repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(job_class, job, None);
    let executor = JobExecutor::new(repository.clone(), registry);
    (repository, executor)
}

/// Every fire produces exactly one log row carrying its execution id, and
/// the row ends in a terminal state.
#[tokio::test]
async fn property_one_log_row_per_fire_with_terminal_state() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let (repository, executor) = harness(
        "ok",
        Arc::new(CountingJob {
            invocations: invocations.clone(),
        }),
    );
    let config = job_config("ok", 3, 1);

    for _ in 0..4 {
        let outcome = executor.execute(&config).await;
        assert!(outcome.success);
        assert!(outcome.error_message.is_none());
    }

    let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
    assert_eq!(logs.len(), 4);
    for log in &logs {
        assert_eq!(log.status, LogStatus::Success);
        assert_eq!(log.retry_count, 0);
        assert!(log.end_time.is_some());
        assert!(log.duration.is_some());
        let by_execution = repository
            .get_log_by_execution_id(&log.execution_id)
            .await
            .unwrap();
        assert!(by_execution.is_some());
    }

    // Execution ids are unique across fires.
    let mut ids: Vec<&str> = logs.iter().map(|l| l.execution_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

/// A job with retry_count = 0 runs at most once per fire.
#[tokio::test]
async fn property_zero_retries_runs_at_most_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let (repository, executor) = harness(
        "fail",
        Arc::new(FailingJob {
            invocations: invocations.clone(),
        }),
    );
    let config = job_config("fail", 0, 1);

    let outcome = executor.execute(&config).await;
    assert!(!outcome.success);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Failed);
    assert_eq!(logs[0].retry_count, 0);
}

/// A failing job with two retries and a one-second interval makes three
/// attempts, accumulates three error lines on one row, and takes at least
/// two seconds.
#[tokio::test]
async fn property_failing_job_retries_accumulate_on_one_row() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let (repository, executor) = harness(
        "fail",
        Arc::new(FailingJob {
            invocations: invocations.clone(),
        }),
    );
    let config = job_config("fail", 2, 1);

    let outcome = executor.execute(&config).await;
    assert!(!outcome.success);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("always fails"));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.status, LogStatus::Failed);
    assert_eq!(log.retry_count, 2);
    assert_eq!(log.error_message.lines().count(), 3);
    assert!(log.duration.unwrap() >= 2000);
}

/// *For any* configured retry count, a failing job makes retry_count + 1
/// attempts and records retry_count retries on the log row.
#[test]
fn property_retry_limit_enforcement() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    proptest!(ProptestConfig::with_cases(8), |(retry_count in 0i32..4)| {
        runtime.block_on(async {
            let invocations = Arc::new(AtomicUsize::new(0));
            let (repository, executor) = harness(
                "fail",
                Arc::new(FailingJob {
                    invocations: invocations.clone(),
                }),
            );
            let config = job_config("fail", retry_count, 0);

            let outcome = executor.execute(&config).await;
            assert!(!outcome.success);
            assert_eq!(
                invocations.load(Ordering::SeqCst),
                retry_count as usize + 1
            );

            let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].retry_count, retry_count);
        });
    });
}

/// Gray release at 0 percent never runs the body and still records success;
/// at 100 percent every run executes.
#[tokio::test]
async fn property_gray_release_band_edges() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let (repository, executor) = harness(
        "ok",
        Arc::new(CountingJob {
            invocations: invocations.clone(),
        }),
    );

    let mut config = job_config("ok", 0, 0);
    config.gray_release_enabled = true;
    config.gray_release_percent = 0;

    let outcome = executor.execute(&config).await;
    assert!(outcome.success);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
    assert_eq!(logs[0].status, LogStatus::Success);
    assert!(logs[0].execution_log.contains("gray release"));

    config.gray_release_percent = 100;
    let outcome = executor.execute(&config).await;
    assert!(outcome.success);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

/// *For any* job id and instant, the gray decision is deterministic and
/// respects the band edges.
#[test]
fn property_gray_decision_deterministic() {
    proptest!(|(job_id in 0i64..10_000, percent in 0i32..=100)| {
        let now = Utc::now();
        let first = gray_admits(job_id, now, percent);
        let second = gray_admits(job_id, now, percent);
        prop_assert_eq!(first, second);
        if percent == 0 {
            prop_assert!(!first);
        }
        if percent == 100 {
            prop_assert!(first);
        }
    });
}

/// Cancelling the shutdown token during the retry sleep abandons the fire
/// with the interrupted reason.
#[tokio::test]
async fn property_shutdown_interrupts_retry_sleep() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(
        "fail",
        Arc::new(FailingJob {
            invocations: invocations.clone(),
        }),
        None,
    );
    let shutdown = CancellationToken::new();
    let executor = Arc::new(JobExecutor::with_shutdown(
        repository.clone(),
        registry,
        shutdown.clone(),
    ));

    let config = job_config("fail", 5, 60);
    let run = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(&config).await }
    });

    // Give the first attempt time to fail and enter the retry sleep.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    shutdown.cancel();

    let outcome = run.await.unwrap();
    assert!(!outcome.success);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("execution interrupted"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let logs = repository.list_logs_by_job_id(1, 100).await.unwrap();
    assert_eq!(logs[0].status, LogStatus::Failed);
    assert!(logs[0].error_message.contains("execution interrupted"));
}

/// A missing handler fails the fire without panicking and names the class.
#[tokio::test]
async fn property_unregistered_handler_fails_cleanly() {
    let repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(HandlerRegistry::new());
    let executor = JobExecutor::new(repository.clone(), registry);

    let config = job_config("nobody-registered-this", 0, 0);
    let outcome = executor.execute(&config).await;
    assert!(!outcome.success);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("nobody-registered-this"));
}
