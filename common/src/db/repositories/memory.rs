// In-memory repository backend for tests and database-less operation.
//
// Semantics mirror the PostgreSQL backend: saves enforce natural-key
// uniqueness, updates match on id alone, version is a server-side counter.

use crate::errors::StorageError;
use crate::models::{JobConfig, JobLog, JobStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryJobRepository {
    configs: RwLock<HashMap<i64, JobConfig>>,
    logs: RwLock<HashMap<i64, JobLog>>,
    next_config_id: AtomicI64,
    next_log_id: AtomicI64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::db::repositories::JobRepository for InMemoryJobRepository {
    async fn save(&self, config: JobConfig) -> Result<JobConfig, StorageError> {
        let mut configs = self.configs.write().await;

        let duplicate = configs.values().any(|c| {
            c.job_name == config.job_name
                && c.job_group == config.job_group
                && c.environment == config.environment
        });
        if duplicate {
            return Err(StorageError::DuplicateKey(format!(
                "({}, {}, {})",
                config.job_name, config.job_group, config.environment
            )));
        }

        let id = self.next_config_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let stored = JobConfig {
            id,
            version: 1,
            create_time: now,
            update_time: now,
            ..config
        };
        configs.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, config: JobConfig) -> Result<JobConfig, StorageError> {
        let mut configs = self.configs.write().await;

        let current = configs
            .get(&config.id)
            .ok_or_else(|| StorageError::NotFound(format!("Job config not found: {}", config.id)))?;

        // All payload columns are written as given; version and the audit
        // timestamps stay repository-owned.
        let stored = JobConfig {
            version: current.version + 1,
            create_time: current.create_time,
            update_time: Utc::now(),
            ..config
        };
        configs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<JobConfig>, StorageError> {
        Ok(self.configs.read().await.get(&id).cloned())
    }

    async fn get_by_natural_key(
        &self,
        job_name: &str,
        job_group: &str,
        environment: &str,
    ) -> Result<Option<JobConfig>, StorageError> {
        Ok(self
            .configs
            .read()
            .await
            .values()
            .find(|c| {
                c.job_name == job_name
                    && c.job_group == job_group
                    && c.environment == environment
            })
            .cloned())
    }

    async fn list_all(&self, environment: Option<&str>) -> Result<Vec<JobConfig>, StorageError> {
        let configs = self.configs.read().await;
        let mut rows: Vec<JobConfig> = configs
            .values()
            .filter(|c| environment.map_or(true, |env| c.environment == env))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn list_by_status(
        &self,
        status: JobStatus,
        environment: Option<&str>,
    ) -> Result<Vec<JobConfig>, StorageError> {
        let configs = self.configs.read().await;
        let mut rows: Vec<JobConfig> = configs
            .values()
            .filter(|c| c.status == status)
            .filter(|c| environment.map_or(true, |env| c.environment == env))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        Ok(self.configs.write().await.remove(&id).is_some())
    }

    async fn save_log(&self, log: JobLog) -> Result<JobLog, StorageError> {
        let mut logs = self.logs.write().await;
        let id = self.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = JobLog { id, ..log };
        logs.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_log(&self, log: &JobLog) -> Result<(), StorageError> {
        let mut logs = self.logs.write().await;
        let current = logs
            .get_mut(&log.id)
            .ok_or_else(|| StorageError::NotFound(format!("Job log not found: {}", log.id)))?;

        current.end_time = log.end_time;
        current.duration = log.duration;
        current.status = log.status;
        current.retry_count = log.retry_count;
        current.execution_log = log.execution_log.clone();
        current.error_message = log.error_message.clone();
        Ok(())
    }

    async fn get_log_by_id(&self, id: i64) -> Result<Option<JobLog>, StorageError> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn get_log_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<JobLog>, StorageError> {
        Ok(self
            .logs
            .read()
            .await
            .values()
            .find(|l| l.execution_id == execution_id)
            .cloned())
    }

    async fn list_logs_by_job_id(
        &self,
        job_id: i64,
        limit: i64,
    ) -> Result<Vec<JobLog>, StorageError> {
        let logs = self.logs.read().await;
        let mut rows: Vec<JobLog> = logs.values().filter(|l| l.job_id == job_id).cloned().collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::JobRepository;
    use crate::models::JobType;

    fn config(name: &str) -> JobConfig {
        JobConfig {
            id: 0,
            job_name: name.to_string(),
            job_group: "DEFAULT".to_string(),
            environment: "dev".to_string(),
            job_type: JobType::Quartz,
            job_class: name.to_string(),
            cron_expression: Some("0/5 * * * * ?".to_string()),
            job_params: serde_json::json!({}),
            description: String::new(),
            status: JobStatus::Stopped,
            retry_count: 3,
            retry_interval: 60,
            timeout: 0,
            alert_enabled: false,
            alert_types: Vec::new(),
            alert_receivers: Default::default(),
            gray_release_enabled: false,
            gray_release_percent: 100,
            version: 0,
            creator: "test".to_string(),
            modifier: "test".to_string(),
            create_time: Utc::now(),
            update_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_version() {
        let repo = InMemoryJobRepository::new();
        let stored = repo.save(config("a")).await.unwrap();
        assert!(stored.id > 0);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_natural_key() {
        let repo = InMemoryJobRepository::new();
        repo.save(config("a")).await.unwrap();
        let err = repo.save(config("a")).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_update_matches_on_id_alone() {
        // Reading a row, changing one column, then updating must succeed
        // even when another column drifted in storage between read and
        // write; the drifted column ends up at the write payload's value.
        let repo = InMemoryJobRepository::new();
        let stored = repo.save(config("a")).await.unwrap();

        let mut read_copy = repo.get_by_id(stored.id).await.unwrap().unwrap();

        // Concurrent writer changes the description.
        let mut drift = stored.clone();
        drift.description = "changed elsewhere".to_string();
        repo.update(drift).await.unwrap();

        // Stale copy changes only the cron expression.
        read_copy.cron_expression = Some("0/10 * * * * ?".to_string());
        let updated = repo.update(read_copy.clone()).await.unwrap();

        assert_eq!(updated.cron_expression.as_deref(), Some("0/10 * * * * ?"));
        assert_eq!(updated.description, read_copy.description);
        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_update_version_strictly_increases() {
        let repo = InMemoryJobRepository::new();
        let mut row = repo.save(config("a")).await.unwrap();
        for _ in 0..5 {
            let before = row.version;
            let before_update_time = row.update_time;
            row = repo.update(row.clone()).await.unwrap();
            assert!(row.version > before);
            assert!(row.update_time >= before_update_time);
        }
    }

    #[tokio::test]
    async fn test_list_by_status_and_environment() {
        let repo = InMemoryJobRepository::new();
        let mut a = config("a");
        a.status = JobStatus::Running;
        repo.save(a).await.unwrap();
        let mut b = config("b");
        b.environment = "prod".to_string();
        b.status = JobStatus::Running;
        repo.save(b).await.unwrap();
        repo.save(config("c")).await.unwrap();

        let running = repo.list_by_status(JobStatus::Running, None).await.unwrap();
        assert_eq!(running.len(), 2);

        let running_dev = repo
            .list_by_status(JobStatus::Running, Some("dev"))
            .await
            .unwrap();
        assert_eq!(running_dev.len(), 1);
        assert_eq!(running_dev[0].job_name, "a");
    }

    #[tokio::test]
    async fn test_log_round_trip() {
        let repo = InMemoryJobRepository::new();
        let stored = repo.save(config("a")).await.unwrap();
        let log = JobLog::started(
            &stored,
            "exec-1".to_string(),
            Utc::now(),
            "127.0.0.1".to_string(),
            "test-host".to_string(),
        );
        let mut saved = repo.save_log(log).await.unwrap();
        assert!(saved.id > 0);

        saved.status = crate::models::LogStatus::Success;
        saved.end_time = Some(Utc::now());
        saved.duration = Some(12);
        repo.update_log(&saved).await.unwrap();

        let fetched = repo
            .get_log_by_execution_id("exec-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, crate::models::LogStatus::Success);
        assert_eq!(fetched.duration, Some(12));
    }
}
