// Execution context handed to job implementations.

use crate::models::JobConfig;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Default)]
struct LogBuffers {
    execution_log: String,
    error_message: String,
}

/// JobContext exposes a fire's identity and parameters to the job body,
/// plus two appenders that accumulate onto the fire's log row.
///
/// Appenders never fail the job: a poisoned buffer is logged at warn and the
/// line dropped.
pub struct JobContext {
    job_id: i64,
    job_name: String,
    job_group: String,
    execution_id: String,
    params: serde_json::Value,
    timeout_seconds: Option<u64>,
    buffers: Arc<Mutex<LogBuffers>>,
}

impl JobContext {
    pub fn new(config: &JobConfig, execution_id: String) -> Self {
        Self {
            job_id: config.id,
            job_name: config.job_name.clone(),
            job_group: config.job_group.clone(),
            execution_id,
            params: config.job_params.clone(),
            timeout_seconds: (config.timeout > 0).then_some(config.timeout as u64),
            buffers: Arc::new(Mutex::new(LogBuffers::default())),
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_group(&self) -> &str {
        &self.job_group
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Job parameters as configured on the row.
    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// Serialised job parameters.
    pub fn params_json(&self) -> String {
        self.params.to_string()
    }

    /// Soft timeout surfaced from the configuration. Advisory: the core does
    /// not forcibly abort; implementers decide what to do with it.
    pub fn timeout_seconds(&self) -> Option<u64> {
        self.timeout_seconds
    }

    /// Append a timestamped line to the execution log.
    pub fn log(&self, message: &str) {
        let line = format!("[{}] {}\n", timestamp(), message);
        match self.buffers.lock() {
            Ok(mut buffers) => buffers.execution_log.push_str(&line),
            Err(_) => warn!(execution_id = %self.execution_id, "Dropped execution log line"),
        }
    }

    /// Append a timestamped line to the error accumulator; the execution log
    /// receives the same line prefixed [ERROR].
    pub fn error(&self, message: &str) {
        let ts = timestamp();
        match self.buffers.lock() {
            Ok(mut buffers) => {
                buffers
                    .error_message
                    .push_str(&format!("[{}] {}\n", ts, message));
                buffers
                    .execution_log
                    .push_str(&format!("[{}] [ERROR] {}\n", ts, message));
            }
            Err(_) => warn!(execution_id = %self.execution_id, "Dropped error log line"),
        }
    }

    /// Snapshot of (execution_log, error_message) for persistence.
    pub(crate) fn snapshot(&self) -> (String, String) {
        match self.buffers.lock() {
            Ok(buffers) => (buffers.execution_log.clone(), buffers.error_message.clone()),
            Err(_) => (String::new(), String::new()),
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
