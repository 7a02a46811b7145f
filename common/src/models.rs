use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// JobConfig
// ============================================================================

/// Default job group when none is supplied.
pub const DEFAULT_JOB_GROUP: &str = "DEFAULT";

/// JobConfig is the authoritative description of one scheduled job.
///
/// The natural key is (job_name, job_group, environment); `id` is the
/// surrogate key assigned by the repository. The JSON wire format (REST
/// bodies and ConfigStore documents) uses camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    #[serde(default)]
    pub id: i64,
    pub job_name: String,
    #[serde(default = "default_job_group")]
    pub job_group: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub job_type: JobType,
    /// Opaque identifier resolved against the handler registry; re-bound at
    /// startup to the live registration key if it diverged on disk.
    #[serde(default)]
    pub job_class: String,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default = "default_job_params")]
    pub job_params: serde_json::Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: i32,
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub alert_enabled: bool,
    #[serde(default)]
    pub alert_types: Vec<AlertType>,
    #[serde(default)]
    pub alert_receivers: AlertReceivers,
    #[serde(default)]
    pub gray_release_enabled: bool,
    #[serde(default = "default_gray_release_percent")]
    pub gray_release_percent: i32,
    /// Monotone counter bumped by the repository on every update. Audit only,
    /// never part of a WHERE clause.
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub modifier: String,
    #[serde(default = "Utc::now")]
    pub create_time: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub update_time: DateTime<Utc>,
}

fn default_job_group() -> String {
    DEFAULT_JOB_GROUP.to_string()
}

fn default_job_params() -> serde_json::Value {
    serde_json::json!({})
}

fn default_retry_count() -> i32 {
    3
}

fn default_retry_interval() -> i32 {
    60
}

fn default_gray_release_percent() -> i32 {
    100
}

impl JobConfig {
    /// The ConfigStore data id under which this job's document is published.
    /// Format: `scheduler.job.<jobName>.<jobGroup>.<environment>.json`
    pub fn data_id(&self) -> String {
        job_data_id(&self.job_name, &self.job_group, &self.environment)
    }
}

/// Build the ConfigStore data id for a job's natural key.
pub fn job_data_id(job_name: &str, job_group: &str, environment: &str) -> String {
    format!("scheduler.job.{}.{}.{}.json", job_name, job_group, environment)
}

/// JobType selects the trigger backend topology.
///
/// Quartz jobs are fired in-process by the trigger engine (or the cooperative
/// fallback loop); External jobs are scheduled elsewhere and the core merely
/// records intent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobType {
    #[default]
    Quartz,
    External,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Quartz => write!(f, "QUARTZ"),
            JobType::External => write!(f, "EXTERNAL"),
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUARTZ" => Ok(JobType::Quartz),
            "EXTERNAL" => Ok(JobType::External),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

impl TryFrom<String> for JobType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Desired lifecycle state of a job. A job is live in the scheduler iff its
/// persisted status is Running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Running,
    #[default]
    Stopped,
    Paused,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Stopped => write!(f, "STOPPED"),
            JobStatus::Paused => write!(f, "PAUSED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "STOPPED" => Ok(JobStatus::Stopped),
            "PAUSED" => Ok(JobStatus::Paused),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Out-of-band notification channels. Carried through unchanged; delivery is
/// a collaborator concern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    Dingtalk,
    Wechat,
    Email,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::Dingtalk => write!(f, "DINGTALK"),
            AlertType::Wechat => write!(f, "WECHAT"),
            AlertType::Email => write!(f, "EMAIL"),
        }
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DINGTALK" => Ok(AlertType::Dingtalk),
            "WECHAT" => Ok(AlertType::Wechat),
            "EMAIL" => Ok(AlertType::Email),
            _ => Err(format!("Invalid alert type: {}", s)),
        }
    }
}

/// Structured alert contacts, one list per channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertReceivers {
    #[serde(default)]
    pub dingtalk: Vec<String>,
    #[serde(default)]
    pub wechat: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
}

// ============================================================================
// JobLog
// ============================================================================

/// JobLog records one execution fire. The row is inserted in Running state
/// before the job body runs and updated in place to a terminal state exactly
/// once; retries of the same fire share the execution_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    #[serde(default)]
    pub id: i64,
    pub job_id: i64,
    pub job_name: String,
    pub job_group: String,
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start_time and end_time.
    pub duration: Option<i64>,
    pub status: LogStatus,
    pub retry_count: i32,
    pub server_ip: String,
    pub server_name: String,
    /// Newline-separated, timestamp-prefixed user log lines.
    pub execution_log: String,
    /// Newline-separated error lines accumulated across retries.
    pub error_message: String,
}

impl JobLog {
    /// Create the initial Running row for a fresh fire.
    pub fn started(
        config: &JobConfig,
        execution_id: String,
        start_time: DateTime<Utc>,
        server_ip: String,
        server_name: String,
    ) -> Self {
        Self {
            id: 0,
            job_id: config.id,
            job_name: config.job_name.clone(),
            job_group: config.job_group.clone(),
            execution_id,
            start_time,
            end_time: None,
            duration: None,
            status: LogStatus::Running,
            retry_count: 0,
            server_ip,
            server_name,
            execution_log: String::new(),
            error_message: String::new(),
        }
    }
}

/// Execution outcome of a fire. Terminal states are Success and Failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Running => write!(f, "RUNNING"),
            LogStatus::Success => write!(f, "SUCCESS"),
            LogStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(LogStatus::Running),
            "SUCCESS" => Ok(LogStatus::Success),
            "FAILED" => Ok(LogStatus::Failed),
            _ => Err(format!("Invalid log status: {}", s)),
        }
    }
}

impl TryFrom<String> for LogStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

// ============================================================================
// ConfigStore job document
// ============================================================================

use crate::errors::ConfigurationError;

/// A job document as published to / received from the ConfigStore: every key
/// optional, camelCase, unknown keys ignored. Overlaying a document onto a
/// row touches only the keys present in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocument {
    pub job_name: Option<String>,
    pub job_group: Option<String>,
    pub environment: Option<String>,
    pub job_type: Option<JobType>,
    pub job_class: Option<String>,
    pub cron_expression: Option<String>,
    pub job_params: Option<serde_json::Value>,
    pub description: Option<String>,
    pub status: Option<JobStatus>,
    pub retry_count: Option<i32>,
    pub retry_interval: Option<i32>,
    pub timeout: Option<i32>,
    pub alert_enabled: Option<bool>,
    pub alert_types: Option<Vec<AlertType>>,
    pub alert_receivers: Option<AlertReceivers>,
    pub gray_release_enabled: Option<bool>,
    pub gray_release_percent: Option<i32>,
    /// Carried for round-trips; the repository owns the counter and ignores
    /// any published value.
    pub version: Option<i64>,
}

impl JobDocument {
    /// Parse a document from ConfigStore content.
    pub fn parse(content: &str) -> Result<Self, ConfigurationError> {
        if content.trim().is_empty() {
            return Err(ConfigurationError::MalformedDocument(
                "empty document".to_string(),
            ));
        }
        serde_json::from_str(content)
            .map_err(|e| ConfigurationError::MalformedDocument(e.to_string()))
    }

    /// Overlay the keys present in this document onto an existing row.
    /// Audit fields and `version` are repository-owned and left untouched.
    pub fn overlay(&self, config: &mut JobConfig) {
        if let Some(v) = &self.job_name {
            config.job_name = v.clone();
        }
        if let Some(v) = &self.job_group {
            config.job_group = v.clone();
        }
        if let Some(v) = &self.environment {
            config.environment = v.clone();
        }
        if let Some(v) = self.job_type {
            config.job_type = v;
        }
        if let Some(v) = &self.job_class {
            config.job_class = v.clone();
        }
        if let Some(v) = &self.cron_expression {
            config.cron_expression = Some(v.clone());
        }
        if let Some(v) = &self.job_params {
            config.job_params = v.clone();
        }
        if let Some(v) = &self.description {
            config.description = v.clone();
        }
        if let Some(v) = self.status {
            config.status = v;
        }
        if let Some(v) = self.retry_count {
            config.retry_count = v;
        }
        if let Some(v) = self.retry_interval {
            config.retry_interval = v;
        }
        if let Some(v) = self.timeout {
            config.timeout = v;
        }
        if let Some(v) = self.alert_enabled {
            config.alert_enabled = v;
        }
        if let Some(v) = &self.alert_types {
            config.alert_types = v.clone();
        }
        if let Some(v) = &self.alert_receivers {
            config.alert_receivers = v.clone();
        }
        if let Some(v) = self.gray_release_enabled {
            config.gray_release_enabled = v;
        }
        if let Some(v) = self.gray_release_percent {
            config.gray_release_percent = v;
        }
    }

    /// Build a fresh JobConfig from a document describing a job the database
    /// has never seen. jobName, jobGroup, environment, jobType, jobClass and
    /// status must be present; cronExpression may be null for jobs scheduled
    /// elsewhere; the remaining keys take their documented defaults.
    pub fn into_new_config(self) -> Result<JobConfig, ConfigurationError> {
        let job_name = self
            .job_name
            .ok_or_else(|| ConfigurationError::MissingField("jobName".to_string()))?;
        let job_group = self
            .job_group
            .ok_or_else(|| ConfigurationError::MissingField("jobGroup".to_string()))?;
        let environment = self
            .environment
            .ok_or_else(|| ConfigurationError::MissingField("environment".to_string()))?;
        let job_type = self
            .job_type
            .ok_or_else(|| ConfigurationError::MissingField("jobType".to_string()))?;
        let job_class = self
            .job_class
            .ok_or_else(|| ConfigurationError::MissingField("jobClass".to_string()))?;
        let status = self
            .status
            .ok_or_else(|| ConfigurationError::MissingField("status".to_string()))?;

        let now = Utc::now();
        Ok(JobConfig {
            id: 0,
            job_name,
            job_group,
            environment,
            job_type,
            job_class,
            cron_expression: self.cron_expression,
            job_params: self.job_params.unwrap_or_else(default_job_params),
            description: self.description.unwrap_or_default(),
            status,
            retry_count: self.retry_count.unwrap_or_else(default_retry_count),
            retry_interval: self.retry_interval.unwrap_or_else(default_retry_interval),
            timeout: self.timeout.unwrap_or_default(),
            alert_enabled: self.alert_enabled.unwrap_or_default(),
            alert_types: self.alert_types.unwrap_or_default(),
            alert_receivers: self.alert_receivers.unwrap_or_default(),
            gray_release_enabled: self.gray_release_enabled.unwrap_or_default(),
            gray_release_percent: self
                .gray_release_percent
                .unwrap_or_else(default_gray_release_percent),
            version: 0,
            creator: "configstore".to_string(),
            modifier: "configstore".to_string(),
            create_time: now,
            update_time: now,
        })
    }
}
