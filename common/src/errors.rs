// Error handling framework

use thiserror::Error;

/// Configuration-level errors: malformed cron expressions, unknown enum
/// values, malformed documents. Surfaced to the caller; never applied.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Unknown job status: {0}")]
    UnknownJobStatus(String),

    #[error("Unknown alert type: {0}")]
    UnknownAlertType(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Malformed data id: {0}")]
    MalformedDataId(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Repository I/O errors. Retryable at the caller's discretion; the core
/// never auto-retries a storage failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),
}

/// Scheduler-side errors: duplicate handle registration, invalid handle
/// transitions.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Job {0} is already scheduled")]
    DuplicateJob(i64),

    #[error("No scheduled handle for job {0}")]
    HandleNotFound(i64),

    #[error("Invalid handle transition for job {job_id}: {reason}")]
    InvalidTransition { job_id: i64, reason: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },
}

/// Errors raised from inside a job body or the execution machinery around it.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Job handler not registered: {0}")]
    HandlerNotFound(String),

    #[error("Job execution failed: {0}")]
    JobFailed(String),

    #[error("execution interrupted")]
    Interrupted,
}

/// ConfigStore unavailability. Transient by definition: callers fall back to
/// local cache, process environment, and defaults, and retry on the next
/// scheduled refresh.
#[derive(Error, Debug)]
pub enum RemoteConfigError {
    #[error("ConfigStore unavailable: {0}")]
    Unavailable(String),

    #[error("ConfigStore request timed out after {0} ms")]
    Timeout(u64),

    #[error("No document for data id {0}")]
    DocumentNotFound(String),

    #[error("Publish rejected for data id {data_id}: {reason}")]
    PublishRejected { data_id: String, reason: String },
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => StorageError::DuplicateKey(db_err.message().to_string()),
                        _ => StorageError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    StorageError::QueryFailed(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => {
                StorageError::ConnectionFailed("connection pool timed out".to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RemoteConfigError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteConfigError::Timeout(0)
        } else {
            RemoteConfigError::Unavailable(err.to_string())
        }
    }
}
