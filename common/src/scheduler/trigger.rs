// Trigger engine seam and the in-process cron implementation.

use crate::errors::{ConfigurationError, SchedulerError};
use crate::models::JobConfig;
use chrono::Utc;
use cron::Schedule as CronSchedule;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Async callback invoked on every fire of a binding.
pub type FireCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque handle to one scheduled binding inside a trigger engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerBinding {
    id: u64,
}

/// Cron firing mechanism consumed by the scheduler. Injectable so hosts can
/// swap the in-process engine for an external one.
pub trait TriggerEngine: Send + Sync {
    /// Register a cron binding that invokes `fire` on schedule.
    fn schedule(
        &self,
        job_id: i64,
        cron_expression: &str,
        fire: FireCallback,
    ) -> Result<TriggerBinding, SchedulerError>;

    fn cancel(&self, binding: &TriggerBinding);

    fn pause(&self, binding: &TriggerBinding);

    fn resume(&self, binding: &TriggerBinding);

    fn is_cron_valid(&self, cron_expression: &str) -> bool;
}

/// Declarative registration surface for jobs whose fires are hosted by an
/// external executor framework. The core records intent only.
pub trait ExternalJobBridge: Send + Sync {
    fn register(&self, config: &JobConfig);

    fn unregister(&self, job_id: i64);
}

/// Validate a Quartz-dialect cron expression: 6 or 7 whitespace-separated
/// fields with seconds precision. 5-field POSIX crons are rejected at
/// configuration time. Quartz's `?` ("no specific value") is accepted in any
/// field and normalized to `*`.
pub fn validate_cron(expression: &str) -> Result<CronSchedule, ConfigurationError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if !(6..=7).contains(&fields.len()) {
        return Err(ConfigurationError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: format!("expected 6 or 7 fields, found {}", fields.len()),
        });
    }

    let normalized: Vec<&str> = fields
        .iter()
        .map(|field| if *field == "?" { "*" } else { *field })
        .collect();

    CronSchedule::from_str(&normalized.join(" ")).map_err(|e| {
        ConfigurationError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        }
    })
}

struct EngineEntry {
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// In-process trigger engine: one tokio task per binding, parsing the cron
/// expression with seconds precision and sleeping until each fire.
#[derive(Default)]
pub struct CronTriggerEngine {
    entries: DashMap<u64, EngineEntry>,
    next_id: AtomicU64,
}

impl CronTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerEngine for CronTriggerEngine {
    fn schedule(
        &self,
        job_id: i64,
        cron_expression: &str,
        fire: FireCallback,
    ) -> Result<TriggerBinding, SchedulerError> {
        let schedule = validate_cron(cron_expression).map_err(|e| {
            SchedulerError::InvalidCronExpression {
                expression: cron_expression.to_string(),
                reason: e.to_string(),
            }
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let paused = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        self.entries.insert(
            id,
            EngineEntry {
                paused: paused.clone(),
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(run_cron_loop(job_id, schedule, paused, cancel, fire));

        Ok(TriggerBinding { id })
    }

    fn cancel(&self, binding: &TriggerBinding) {
        if let Some((_, entry)) = self.entries.remove(&binding.id) {
            entry.cancel.cancel();
        }
    }

    fn pause(&self, binding: &TriggerBinding) {
        if let Some(entry) = self.entries.get(&binding.id) {
            entry.paused.store(true, Ordering::SeqCst);
        }
    }

    fn resume(&self, binding: &TriggerBinding) {
        if let Some(entry) = self.entries.get(&binding.id) {
            entry.paused.store(false, Ordering::SeqCst);
        }
    }

    fn is_cron_valid(&self, cron_expression: &str) -> bool {
        validate_cron(cron_expression).is_ok()
    }
}

/// One scheduler loop for one binding. Each fire is awaited before the next
/// is computed, so a job never overlaps with itself; paused bindings skip
/// their fires without drifting the schedule.
pub(crate) async fn run_cron_loop(
    job_id: i64,
    schedule: CronSchedule,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    fire: FireCallback,
) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(job_id, "Cron schedule has no further fire times");
            break;
        };

        let delay = next - Utc::now();
        if delay.num_milliseconds() > 0 {
            let sleep = match delay.to_std() {
                Ok(d) => d,
                Err(_) => continue,
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        if paused.load(Ordering::SeqCst) {
            continue;
        }

        // In-flight fires complete under their snapshot; cancellation takes
        // effect at the next loop turn.
        fire().await;
    }

    debug!(job_id, "Cron loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_validate_quartz_expressions() {
        assert!(validate_cron("0/5 * * * * ?").is_ok());
        assert!(validate_cron("0 0 12 * * ?").is_ok());
        assert!(validate_cron("0 0 12 * * ? 2030").is_ok());
    }

    #[test]
    fn test_posix_five_field_rejected() {
        let err = validate_cron("*/5 * * * *").unwrap_err();
        assert!(err.to_string().contains("6 or 7 fields"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(validate_cron("not a cron at all x y").is_err());
        assert!(validate_cron("").is_err());
    }

    #[tokio::test]
    async fn test_engine_fires_and_cancels() {
        let engine = CronTriggerEngine::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let fire: FireCallback = Arc::new(move || {
            let fires = fires_clone.clone();
            Box::pin(async move {
                fires.fetch_add(1, Ordering::SeqCst);
            })
        });

        let binding = engine.schedule(1, "* * * * * ?", fire).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        engine.cancel(&binding);
        let fired = fires.load(Ordering::SeqCst);
        assert!(fired >= 1, "expected at least one fire, saw {}", fired);

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        assert!(fires.load(Ordering::SeqCst) <= fired + 1);
    }

    #[tokio::test]
    async fn test_paused_binding_skips_fires() {
        let engine = CronTriggerEngine::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let fires_clone = fires.clone();
        let fire: FireCallback = Arc::new(move || {
            let fires = fires_clone.clone();
            Box::pin(async move {
                fires.fetch_add(1, Ordering::SeqCst);
            })
        });

        let binding = engine.schedule(1, "* * * * * ?", fire).unwrap();
        engine.pause(&binding);
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        engine.resume(&binding);
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        engine.cancel(&binding);
        assert!(fires.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_engine_rejects_invalid_expression() {
        let engine = CronTriggerEngine::new();
        let fire: FireCallback = Arc::new(|| Box::pin(async {}));
        // Outside a runtime this must fail before spawning anything.
        assert!(engine.schedule(1, "bad", fire).is_err());
    }
}
