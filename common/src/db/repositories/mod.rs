// Repository seam for job configuration and execution log rows.
//
// Two backends live behind the trait: `PgJobRepository` over PostgreSQL for
// production and `InMemoryJobRepository` for tests and database-less runs.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryJobRepository;
pub use postgres::PgJobRepository;

use crate::errors::StorageError;
use crate::models::{JobConfig, JobLog, JobStatus};
use async_trait::async_trait;

/// Persistence gateway for JobConfig and JobLog rows.
///
/// `update` and `update_log` match on the primary key alone. Full-row WHERE
/// matching is rejected by design: it makes updates fail whenever any other
/// column drifted between read and write. The `version` column stays on the
/// row as a monotone audit counter, incremented by the repository on every
/// update and never used as a collision guard.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new row. Returns the stored row with its assigned id,
    /// audit timestamps, and version 1.
    async fn save(&self, config: JobConfig) -> Result<JobConfig, StorageError>;

    /// Update by id only. All payload columns are written as given;
    /// version is incremented server-side and update_time refreshed.
    /// Returns the stored row after the write.
    async fn update(&self, config: JobConfig) -> Result<JobConfig, StorageError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<JobConfig>, StorageError>;

    async fn get_by_natural_key(
        &self,
        job_name: &str,
        job_group: &str,
        environment: &str,
    ) -> Result<Option<JobConfig>, StorageError>;

    async fn list_all(&self, environment: Option<&str>) -> Result<Vec<JobConfig>, StorageError>;

    async fn list_by_status(
        &self,
        status: JobStatus,
        environment: Option<&str>,
    ) -> Result<Vec<JobConfig>, StorageError>;

    /// Delete a row. Returns false when no row had the id.
    async fn delete(&self, id: i64) -> Result<bool, StorageError>;

    /// Insert an execution log row, returning it with its assigned id.
    async fn save_log(&self, log: JobLog) -> Result<JobLog, StorageError>;

    /// Update a log row by id only.
    async fn update_log(&self, log: &JobLog) -> Result<(), StorageError>;

    async fn get_log_by_id(&self, id: i64) -> Result<Option<JobLog>, StorageError>;

    async fn get_log_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<JobLog>, StorageError>;

    /// Most recent logs for a job, newest first.
    async fn list_logs_by_job_id(
        &self,
        job_id: i64,
        limit: i64,
    ) -> Result<Vec<JobLog>, StorageError>;
}
