// In-memory representation of one scheduled job.

use super::trigger::{
    run_cron_loop, validate_cron, ExternalJobBridge, FireCallback, TriggerBinding, TriggerEngine,
};
use crate::errors::SchedulerError;
use crate::executor::JobExecutor;
use crate::models::{JobConfig, JobType};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle lifecycle. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    New,
    Started,
    Paused,
    Stopped,
}

const STATE_NEW: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// One live job in the scheduler: the configuration snapshot it fires with,
/// its trigger binding, and a small state machine
/// (New → Started ↔ Paused, any → Stopped).
///
/// A handle's snapshot is immutable; configuration changes replace the whole
/// handle under the same job id, so a fire in progress completes under the
/// old snapshot and the next fire sees the new one.
pub struct JobHandle {
    config: Arc<JobConfig>,
    state: AtomicU8,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    binding: OnceLock<TriggerBinding>,
}

impl JobHandle {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: AtomicU8::new(STATE_NEW),
            paused: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            binding: OnceLock::new(),
        }
    }

    pub fn config(&self) -> Arc<JobConfig> {
        self.config.clone()
    }

    pub fn state(&self) -> HandleState {
        match self.state.load(Ordering::SeqCst) {
            STATE_NEW => HandleState::New,
            STATE_STARTED => HandleState::Started,
            STATE_PAUSED => HandleState::Paused,
            _ => HandleState::Stopped,
        }
    }

    /// Start firing. Quartz jobs bind to the trigger engine when one is
    /// present; without an engine the handle degrades to a self-scheduled
    /// cooperative loop that parses the cron expression itself. External
    /// jobs register declaratively with the bridge, or no-op with a warning
    /// when no external framework is wired in.
    pub fn start(
        &self,
        executor: Arc<JobExecutor>,
        engine: Option<&Arc<dyn TriggerEngine>>,
        bridge: Option<&Arc<dyn ExternalJobBridge>>,
    ) -> Result<(), SchedulerError> {
        if self.state.load(Ordering::SeqCst) != STATE_NEW {
            return Err(SchedulerError::InvalidTransition {
                job_id: self.config.id,
                reason: "handle already started".to_string(),
            });
        }

        match self.config.job_type {
            JobType::Quartz => {
                let expression = self.config.cron_expression.as_deref().ok_or_else(|| {
                    SchedulerError::InvalidCronExpression {
                        expression: String::new(),
                        reason: "missing cron expression".to_string(),
                    }
                })?;

                let fire = make_fire(executor, self.config.clone());

                match engine {
                    Some(engine) => {
                        let binding = engine.schedule(self.config.id, expression, fire)?;
                        let _ = self.binding.set(binding);
                    }
                    None => {
                        let schedule = validate_cron(expression).map_err(|e| {
                            SchedulerError::InvalidCronExpression {
                                expression: expression.to_string(),
                                reason: e.to_string(),
                            }
                        })?;
                        tokio::spawn(run_cron_loop(
                            self.config.id,
                            schedule,
                            self.paused.clone(),
                            self.cancel.clone(),
                            fire,
                        ));
                    }
                }
            }
            JobType::External => match bridge {
                Some(bridge) => bridge.register(&self.config),
                None => warn!(
                    job_id = self.config.id,
                    job_name = %self.config.job_name,
                    "No external executor bridge configured, job is recorded but will not fire"
                ),
            },
        }

        self.state.store(STATE_STARTED, Ordering::SeqCst);
        Ok(())
    }

    pub fn pause(&self, engine: Option<&Arc<dyn TriggerEngine>>) -> Result<(), SchedulerError> {
        if self.state.load(Ordering::SeqCst) != STATE_STARTED {
            return Err(SchedulerError::InvalidTransition {
                job_id: self.config.id,
                reason: "only a started handle can be paused".to_string(),
            });
        }

        self.paused.store(true, Ordering::SeqCst);
        if let (Some(engine), Some(binding)) = (engine, self.binding.get()) {
            engine.pause(binding);
        }
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
        Ok(())
    }

    pub fn resume(&self, engine: Option<&Arc<dyn TriggerEngine>>) -> Result<(), SchedulerError> {
        if self.state.load(Ordering::SeqCst) != STATE_PAUSED {
            return Err(SchedulerError::InvalidTransition {
                job_id: self.config.id,
                reason: "only a paused handle can be resumed".to_string(),
            });
        }

        self.paused.store(false, Ordering::SeqCst);
        if let (Some(engine), Some(binding)) = (engine, self.binding.get()) {
            engine.resume(binding);
        }
        self.state.store(STATE_STARTED, Ordering::SeqCst);
        Ok(())
    }

    /// Stop firing and release the trigger binding. Terminal and idempotent;
    /// an in-flight fire is allowed to finish.
    pub fn stop(
        &self,
        engine: Option<&Arc<dyn TriggerEngine>>,
        bridge: Option<&Arc<dyn ExternalJobBridge>>,
    ) {
        if self.state.swap(STATE_STOPPED, Ordering::SeqCst) == STATE_STOPPED {
            return;
        }

        self.cancel.cancel();
        if let (Some(engine), Some(binding)) = (engine, self.binding.get()) {
            engine.cancel(binding);
        }
        if self.config.job_type == JobType::External {
            if let Some(bridge) = bridge {
                bridge.unregister(self.config.id);
            }
        }
    }
}

fn make_fire(executor: Arc<JobExecutor>, config: Arc<JobConfig>) -> FireCallback {
    Arc::new(move || {
        let executor = executor.clone();
        let config = config.clone();
        Box::pin(async move {
            let outcome = executor.execute(&config).await;
            if !outcome.success {
                warn!(
                    job_id = config.id,
                    job_name = %config.job_name,
                    "Scheduled fire failed"
                );
            }
        })
    })
}
