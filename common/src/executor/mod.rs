// Job execution: one fire end-to-end, with retries and log accumulation.

pub mod context;

pub use context::JobContext;

use crate::db::repositories::JobRepository;
use crate::identity;
use crate::models::{JobConfig, JobLog, LogStatus};
use crate::registry::HandlerRegistry;
use crate::telemetry;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a fire as reported to callers (scheduler loops and the ad-hoc
/// execute endpoint).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Executes a single job invocation: allocates the execution id, writes the
/// log row transitions, resolves the live implementation, and drives the
/// retry loop. Log-write failures are swallowed at warn so that scheduling
/// is never blocked by logging faults.
pub struct JobExecutor {
    repository: Arc<dyn JobRepository>,
    registry: Arc<HandlerRegistry>,
    shutdown: CancellationToken,
}

impl JobExecutor {
    pub fn new(repository: Arc<dyn JobRepository>, registry: Arc<HandlerRegistry>) -> Self {
        Self::with_shutdown(repository, registry, CancellationToken::new())
    }

    /// Wire the executor to a process-wide shutdown token; cancellation
    /// interrupts retry sleeps cooperatively.
    pub fn with_shutdown(
        repository: Arc<dyn JobRepository>,
        registry: Arc<HandlerRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            registry,
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run one fire of the given configuration snapshot.
    #[instrument(skip(self, config), fields(job_id = config.id, job_name = %config.job_name))]
    pub async fn execute(&self, config: &JobConfig) -> ExecutionOutcome {
        let execution_id = Uuid::new_v4().to_string();
        let start_time = Utc::now();
        let server = identity::resolve();

        let initial = JobLog::started(
            config,
            execution_id.clone(),
            start_time,
            server.ip,
            server.host,
        );
        let mut log = match self.repository.save_log(initial.clone()).await {
            Ok(saved) => saved,
            Err(e) => {
                // Detached row: further log writes are skipped, the fire
                // itself still runs.
                warn!(execution_id = %execution_id, error = %e, "Failed to insert job log");
                initial
            }
        };

        let context = JobContext::new(config, execution_id.clone());

        // Gray release gate: runs outside the rollout band short-circuit as
        // successful without invoking the body.
        if config.gray_release_enabled
            && !gray_admits(config.id, start_time, config.gray_release_percent)
        {
            context.log(&format!(
                "gray release: run skipped, outside {}% rollout band",
                config.gray_release_percent
            ));
            self.finalize(&mut log, &context, true, start_time).await;
            return ExecutionOutcome {
                success: true,
                error_message: None,
            };
        }

        let max_attempts = config.retry_count.max(0) as u32 + 1;
        let retry_delay = Duration::from_secs(config.retry_interval.max(0) as u64);
        let mut attempts_made = 0u32;
        let mut success = false;
        let mut interrupted = false;

        while attempts_made < max_attempts {
            attempts_made += 1;

            // The live implementation is resolved on every attempt so a
            // handler registered mid-retry is picked up.
            let result = match self.registry.get(&config.job_class) {
                Some(job) => job.execute(&context).await,
                None => {
                    warn!(job_class = %config.job_class, "Job handler not registered");
                    Err(crate::errors::ExecutionError::HandlerNotFound(
                        config.job_class.clone(),
                    ))
                }
            };

            match result {
                Ok(()) => {
                    success = true;
                    break;
                }
                Err(e) => {
                    context.error(&format!("attempt {} failed: {}", attempts_made, e));
                    log.retry_count = attempts_made.saturating_sub(1) as i32;

                    if attempts_made < max_attempts {
                        self.persist_progress(&mut log, &context).await;

                        tokio::select! {
                            _ = tokio::time::sleep(retry_delay) => {}
                            _ = self.shutdown.cancelled() => {
                                interrupted = true;
                            }
                        }
                        if interrupted {
                            context.error("execution interrupted");
                            break;
                        }
                    }
                }
            }
        }

        self.finalize(&mut log, &context, success, start_time).await;

        let error_message = if success {
            None
        } else {
            let (_, errors) = context.snapshot();
            Some(if errors.is_empty() {
                "execution failed".to_string()
            } else {
                errors
            })
        };

        info!(
            execution_id = %execution_id,
            success,
            retries = log.retry_count,
            "Fire finished"
        );

        ExecutionOutcome {
            success,
            error_message,
        }
    }

    /// Persist intermediate accumulators between attempts. Best-effort.
    async fn persist_progress(&self, log: &mut JobLog, context: &JobContext) {
        let (execution_log, error_message) = context.snapshot();
        log.execution_log = execution_log;
        log.error_message = error_message;
        if log.id > 0 {
            if let Err(e) = self.repository.update_log(log).await {
                warn!(execution_id = %log.execution_id, error = %e, "Failed to update job log");
            }
        }
    }

    /// Transition the log row to its terminal state exactly once.
    async fn finalize(
        &self,
        log: &mut JobLog,
        context: &JobContext,
        success: bool,
        start_time: DateTime<Utc>,
    ) {
        let end_time = Utc::now();
        let duration_ms = (end_time - start_time).num_milliseconds();

        let (execution_log, error_message) = context.snapshot();
        log.execution_log = execution_log;
        log.error_message = error_message;
        log.end_time = Some(end_time);
        log.duration = Some(duration_ms);
        log.status = if success {
            LogStatus::Success
        } else {
            LogStatus::Failed
        };

        if log.id > 0 {
            if let Err(e) = self.repository.update_log(log).await {
                warn!(execution_id = %log.execution_id, error = %e, "Failed to finalize job log");
            }
        }

        telemetry::record_execution(&log.job_name, success, duration_ms as f64 / 1000.0);
    }
}

/// Deterministic gray-release inclusion: sha256 over `(job_id, minute bucket
/// of the start time)` modulo 100 must fall below the configured percent.
/// Every run of a job within one minute bucket gets the same decision.
pub fn gray_admits(job_id: i64, start_time: DateTime<Utc>, percent: i32) -> bool {
    let percent = percent.clamp(0, 100);
    if percent == 0 {
        return false;
    }
    if percent == 100 {
        return true;
    }

    let bucket = start_time.timestamp() / 60;
    let hash = Sha256::digest(format!("{}:{}", job_id, bucket).as_bytes());
    let prefix = u64::from_be_bytes(hash[..8].try_into().expect("sha256 yields 32 bytes"));
    (prefix % 100) < percent as u64
}
