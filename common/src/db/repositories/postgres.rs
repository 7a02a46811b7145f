// PostgreSQL repository implementation

use crate::db::DbPool;
use crate::errors::StorageError;
use crate::models::{JobConfig, JobLog, JobStatus};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;

const CONFIG_COLUMNS: &str = "id, job_name, job_group, environment, job_type, job_class, \
     cron_expression, job_params, description, status, retry_count, retry_interval, \
     timeout, alert_enabled, alert_types, alert_receivers, gray_release_enabled, \
     gray_release_percent, version, creator, modifier, create_time, update_time";

const LOG_COLUMNS: &str = "id, job_id, job_name, job_group, execution_id, start_time, end_time, \
     duration, status, retry_count, server_ip, server_name, execution_log, error_message";

/// Repository backend over PostgreSQL. Row mapping is done by hand with
/// `try_get`; enum columns are stored as their UPPERCASE strings and the
/// structured columns (job_params, alert_types, alert_receivers) as JSONB.
pub struct PgJobRepository {
    pool: DbPool,
}

impl PgJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_config_row(row: &PgRow) -> Result<JobConfig, StorageError> {
        let job_type: String = row.try_get("job_type")?;
        let status: String = row.try_get("status")?;
        let alert_types: serde_json::Value = row.try_get("alert_types")?;
        let alert_receivers: serde_json::Value = row.try_get("alert_receivers")?;

        Ok(JobConfig {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            job_group: row.try_get("job_group")?,
            environment: row.try_get("environment")?,
            job_type: job_type.parse().map_err(StorageError::QueryFailed)?,
            job_class: row.try_get("job_class")?,
            cron_expression: row.try_get("cron_expression")?,
            job_params: row.try_get("job_params")?,
            description: row.try_get("description")?,
            status: status.parse().map_err(StorageError::QueryFailed)?,
            retry_count: row.try_get("retry_count")?,
            retry_interval: row.try_get("retry_interval")?,
            timeout: row.try_get("timeout")?,
            alert_enabled: row.try_get("alert_enabled")?,
            alert_types: serde_json::from_value(alert_types)
                .map_err(|e| StorageError::QueryFailed(format!("alert_types: {}", e)))?,
            alert_receivers: serde_json::from_value(alert_receivers)
                .map_err(|e| StorageError::QueryFailed(format!("alert_receivers: {}", e)))?,
            gray_release_enabled: row.try_get("gray_release_enabled")?,
            gray_release_percent: row.try_get("gray_release_percent")?,
            version: row.try_get("version")?,
            creator: row.try_get("creator")?,
            modifier: row.try_get("modifier")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    fn map_log_row(row: &PgRow) -> Result<JobLog, StorageError> {
        let status: String = row.try_get("status")?;

        Ok(JobLog {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            job_name: row.try_get("job_name")?,
            job_group: row.try_get("job_group")?,
            execution_id: row.try_get("execution_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration: row.try_get("duration")?,
            status: status.parse().map_err(StorageError::QueryFailed)?,
            retry_count: row.try_get("retry_count")?,
            server_ip: row.try_get("server_ip")?,
            server_name: row.try_get("server_name")?,
            execution_log: row.try_get("execution_log")?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn alert_columns_json(
        config: &JobConfig,
    ) -> Result<(serde_json::Value, serde_json::Value), StorageError> {
        let alert_types = serde_json::to_value(&config.alert_types)
            .map_err(|e| StorageError::QueryFailed(format!("alert_types: {}", e)))?;
        let alert_receivers = serde_json::to_value(&config.alert_receivers)
            .map_err(|e| StorageError::QueryFailed(format!("alert_receivers: {}", e)))?;
        Ok((alert_types, alert_receivers))
    }
}

#[async_trait]
impl crate::db::repositories::JobRepository for PgJobRepository {
    #[instrument(skip(self, config), fields(job_name = %config.job_name))]
    async fn save(&self, config: JobConfig) -> Result<JobConfig, StorageError> {
        let (alert_types, alert_receivers) = Self::alert_columns_json(&config)?;

        let row = sqlx::query(
            r#"
            INSERT INTO scheduler_job_config (
                job_name, job_group, environment, job_type, job_class,
                cron_expression, job_params, description, status, retry_count,
                retry_interval, timeout, alert_enabled, alert_types,
                alert_receivers, gray_release_enabled, gray_release_percent,
                version, creator, modifier, create_time, update_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, 1, $18, $19, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&config.job_name)
        .bind(&config.job_group)
        .bind(&config.environment)
        .bind(config.job_type.to_string())
        .bind(&config.job_class)
        .bind(&config.cron_expression)
        .bind(&config.job_params)
        .bind(&config.description)
        .bind(config.status.to_string())
        .bind(config.retry_count)
        .bind(config.retry_interval)
        .bind(config.timeout)
        .bind(config.alert_enabled)
        .bind(alert_types)
        .bind(alert_receivers)
        .bind(config.gray_release_enabled)
        .bind(config.gray_release_percent)
        .bind(&config.creator)
        .bind(&config.modifier)
        .fetch_one(self.pool.pool())
        .await?;

        let id: i64 = row.try_get("id")?;
        tracing::info!(job_id = id, job_name = %config.job_name, "Job config created");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Job config not found: {}", id)))
    }

    #[instrument(skip(self, config), fields(job_id = config.id))]
    async fn update(&self, config: JobConfig) -> Result<JobConfig, StorageError> {
        let (alert_types, alert_receivers) = Self::alert_columns_json(&config)?;

        let result = sqlx::query(
            r#"
            UPDATE scheduler_job_config
            SET job_name = $2,
                job_group = $3,
                environment = $4,
                job_type = $5,
                job_class = $6,
                cron_expression = $7,
                job_params = $8,
                description = $9,
                status = $10,
                retry_count = $11,
                retry_interval = $12,
                timeout = $13,
                alert_enabled = $14,
                alert_types = $15,
                alert_receivers = $16,
                gray_release_enabled = $17,
                gray_release_percent = $18,
                version = version + 1,
                modifier = $19,
                update_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(config.id)
        .bind(&config.job_name)
        .bind(&config.job_group)
        .bind(&config.environment)
        .bind(config.job_type.to_string())
        .bind(&config.job_class)
        .bind(&config.cron_expression)
        .bind(&config.job_params)
        .bind(&config.description)
        .bind(config.status.to_string())
        .bind(config.retry_count)
        .bind(config.retry_interval)
        .bind(config.timeout)
        .bind(config.alert_enabled)
        .bind(alert_types)
        .bind(alert_receivers)
        .bind(config.gray_release_enabled)
        .bind(config.gray_release_percent)
        .bind(&config.modifier)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Job config not found: {}",
                config.id
            )));
        }

        tracing::info!(job_id = config.id, job_name = %config.job_name, "Job config updated");

        self.get_by_id(config.id).await?.ok_or_else(|| {
            StorageError::NotFound(format!("Job config not found: {}", config.id))
        })
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> Result<Option<JobConfig>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scheduler_job_config WHERE id = $1",
            CONFIG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(Self::map_config_row).transpose()
    }

    #[instrument(skip(self))]
    async fn get_by_natural_key(
        &self,
        job_name: &str,
        job_group: &str,
        environment: &str,
    ) -> Result<Option<JobConfig>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scheduler_job_config \
             WHERE job_name = $1 AND job_group = $2 AND environment = $3",
            CONFIG_COLUMNS
        ))
        .bind(job_name)
        .bind(job_group)
        .bind(environment)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(Self::map_config_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_all(&self, environment: Option<&str>) -> Result<Vec<JobConfig>, StorageError> {
        let rows = match environment {
            Some(env) => {
                sqlx::query(&format!(
                    "SELECT {} FROM scheduler_job_config \
                     WHERE environment = $1 ORDER BY id",
                    CONFIG_COLUMNS
                ))
                .bind(env)
                .fetch_all(self.pool.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM scheduler_job_config ORDER BY id",
                    CONFIG_COLUMNS
                ))
                .fetch_all(self.pool.pool())
                .await?
            }
        };

        rows.iter().map(Self::map_config_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_by_status(
        &self,
        status: JobStatus,
        environment: Option<&str>,
    ) -> Result<Vec<JobConfig>, StorageError> {
        let rows = match environment {
            Some(env) => {
                sqlx::query(&format!(
                    "SELECT {} FROM scheduler_job_config \
                     WHERE status = $1 AND environment = $2 ORDER BY id",
                    CONFIG_COLUMNS
                ))
                .bind(status.to_string())
                .bind(env)
                .fetch_all(self.pool.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM scheduler_job_config WHERE status = $1 ORDER BY id",
                    CONFIG_COLUMNS
                ))
                .bind(status.to_string())
                .fetch_all(self.pool.pool())
                .await?
            }
        };

        rows.iter().map(Self::map_config_row).collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM scheduler_job_config WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(job_id = id, "Job config deleted");
        }
        Ok(deleted)
    }

    #[instrument(skip(self, log), fields(execution_id = %log.execution_id))]
    async fn save_log(&self, log: JobLog) -> Result<JobLog, StorageError> {
        let row = sqlx::query(
            r#"
            INSERT INTO scheduler_job_log (
                job_id, job_name, job_group, execution_id, start_time,
                end_time, duration, status, retry_count, server_ip,
                server_name, execution_log, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(log.job_id)
        .bind(&log.job_name)
        .bind(&log.job_group)
        .bind(&log.execution_id)
        .bind(log.start_time)
        .bind(log.end_time)
        .bind(log.duration)
        .bind(log.status.to_string())
        .bind(log.retry_count)
        .bind(&log.server_ip)
        .bind(&log.server_name)
        .bind(&log.execution_log)
        .bind(&log.error_message)
        .fetch_one(self.pool.pool())
        .await?;

        let id: i64 = row.try_get("id")?;
        tracing::debug!(log_id = id, execution_id = %log.execution_id, "Job log created");

        Ok(JobLog { id, ..log })
    }

    #[instrument(skip(self, log), fields(log_id = log.id))]
    async fn update_log(&self, log: &JobLog) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduler_job_log
            SET end_time = $2,
                duration = $3,
                status = $4,
                retry_count = $5,
                execution_log = $6,
                error_message = $7
            WHERE id = $1
            "#,
        )
        .bind(log.id)
        .bind(log.end_time)
        .bind(log.duration)
        .bind(log.status.to_string())
        .bind(log.retry_count)
        .bind(&log.execution_log)
        .bind(&log.error_message)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Job log not found: {}",
                log.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_log_by_id(&self, id: i64) -> Result<Option<JobLog>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scheduler_job_log WHERE id = $1",
            LOG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(Self::map_log_row).transpose()
    }

    #[instrument(skip(self))]
    async fn get_log_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<JobLog>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scheduler_job_log WHERE execution_id = $1",
            LOG_COLUMNS
        ))
        .bind(execution_id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(Self::map_log_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_logs_by_job_id(
        &self,
        job_id: i64,
        limit: i64,
    ) -> Result<Vec<JobLog>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM scheduler_job_log \
             WHERE job_id = $1 ORDER BY start_time DESC, id DESC LIMIT $2",
            LOG_COLUMNS
        ))
        .bind(job_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter().map(Self::map_log_row).collect()
    }
}
