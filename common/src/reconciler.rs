// Reaction to ConfigStore pushes: parse the changed job document, reconcile
// the database row, and push the required transitions into the scheduler.
//
// Callbacks from the ConfigStore only enqueue onto an unbounded channel; a
// single worker drains it, so pushes are processed serially in receive
// order and a callback never does slow work.

use crate::db::repositories::JobRepository;
use crate::models::{JobConfig, JobDocument, JobStatus};
use crate::scheduler::SchedulerManager;
use crate::telemetry;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

lazy_static! {
    static ref JOB_DATA_ID_RE: Regex =
        Regex::new(r"^scheduler\.job\.([^.]+)\.([^.]+)\.([^.]+)\.json$")
            .expect("job data id pattern is valid");
}

/// One ConfigStore push as delivered to the reconciliation worker.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub data_id: String,
    pub content: String,
}

/// Extract (job_name, job_group, environment) from a job document data id.
pub fn parse_job_data_id(data_id: &str) -> Option<(String, String, String)> {
    JOB_DATA_ID_RE.captures(data_id).map(|captures| {
        (
            captures[1].to_string(),
            captures[2].to_string(),
            captures[3].to_string(),
        )
    })
}

pub struct ConfigChangeReconciler {
    repository: Arc<dyn JobRepository>,
    scheduler: Arc<SchedulerManager>,
}

impl ConfigChangeReconciler {
    pub fn new(repository: Arc<dyn JobRepository>, scheduler: Arc<SchedulerManager>) -> Self {
        Self {
            repository,
            scheduler,
        }
    }

    /// Process one push. Errors are caught and logged here; the next push
    /// for the same document gets a chance to converge.
    #[instrument(skip(self, content))]
    pub async fn on_change(&self, data_id: &str, content: &str) {
        match self.reconcile(data_id, content).await {
            Ok(outcome) => {
                debug!(outcome, "Reconciliation finished");
                telemetry::record_reconciliation(outcome);
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed, awaiting next push");
                telemetry::record_reconciliation("error");
            }
        }
    }

    async fn reconcile(&self, data_id: &str, content: &str) -> anyhow::Result<&'static str> {
        let Some((job_name, job_group, environment)) = parse_job_data_id(data_id) else {
            warn!(data_id, "Data id does not match the job document pattern, discarding");
            return Ok("malformed_data_id");
        };

        let mut document = match JobDocument::parse(content) {
            Ok(document) => document,
            Err(e) => {
                warn!(data_id, error = %e, "Unparseable job document, discarding");
                return Ok("malformed_document");
            }
        };

        let existing = self
            .repository
            .get_by_natural_key(&job_name, &job_group, &environment)
            .await?;

        match existing {
            None => {
                // The natural key of the data id fills in anything the
                // document leaves implicit.
                document.job_name.get_or_insert(job_name);
                document.job_group.get_or_insert(job_group);
                document.environment.get_or_insert(environment);

                let fresh = match document.into_new_config() {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(data_id, error = %e, "Document cannot create a new job, discarding");
                        return Ok("invalid_document");
                    }
                };

                let saved = self.repository.save(fresh).await?;
                info!(job_id = saved.id, job_name = %saved.job_name, "Job created from ConfigStore");

                if saved.status == JobStatus::Running {
                    if let Err(e) = self.scheduler.add_job(saved.clone()) {
                        warn!(job_id = saved.id, error = %e, "Failed to schedule created job");
                    }
                }
                Ok("created")
            }
            Some(row) => {
                // Re-read by id for the latest version and state before
                // overlaying; updates match on id alone, so this is the
                // pattern that avoids writing a stale snapshot.
                let Some(current) = self.repository.get_by_id(row.id).await? else {
                    warn!(job_id = row.id, "Row vanished between reads, discarding push");
                    return Ok("row_vanished");
                };

                let old_status = current.status;
                let old_cron = current.cron_expression.clone();

                let mut next = current;
                document.overlay(&mut next);
                next.modifier = "configstore".to_string();

                let updated = self.repository.update(next).await?;
                apply_scheduler_transition(&self.scheduler, old_status, &old_cron, &updated);
                Ok("updated")
            }
        }
    }
}

/// Map a persisted configuration change onto scheduler operations. Shared by
/// the reconciler and the management API, which mirrors the same mapping.
/// With status unchanged, only a differing cron expression reschedules; any
/// other change (params, description, alerting) is a row-only update, and
/// fires pick the fresh snapshot up on the next status or cron transition.
pub fn apply_scheduler_transition(
    scheduler: &SchedulerManager,
    old_status: JobStatus,
    old_cron: &Option<String>,
    updated: &JobConfig,
) {
    match updated.status {
        JobStatus::Running if old_status != JobStatus::Running => {
            // A paused handle still exists; adding it again would be a
            // duplicate, so it is resumed in place.
            if old_status == JobStatus::Paused && scheduler.contains(updated.id) {
                scheduler.resume_job(updated.id);
            } else if let Err(e) = scheduler.add_job(updated.clone()) {
                warn!(job_id = updated.id, error = %e, "Failed to schedule job");
            }
        }
        JobStatus::Stopped if old_status != JobStatus::Stopped => {
            scheduler.remove_job(updated.id);
        }
        JobStatus::Paused if old_status != JobStatus::Paused => {
            scheduler.pause_job(updated.id);
        }
        _ => {
            if updated.status == JobStatus::Running && &updated.cron_expression != old_cron {
                if let Err(e) = scheduler.update_job(updated.clone()) {
                    warn!(job_id = updated.id, error = %e, "Failed to reschedule job");
                }
            } else {
                debug!(job_id = updated.id, "No scheduler-side action required");
            }
        }
    }
}

/// Spawn the serial reconciliation worker. ConfigStore callbacks send into
/// the returned channel; the worker processes changes in receive order.
pub fn spawn_reconcile_worker(
    reconciler: Arc<ConfigChangeReconciler>,
) -> (mpsc::UnboundedSender<ConfigChange>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ConfigChange>();
    let worker = tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            reconciler.on_change(&change.data_id, &change.content).await;
        }
        debug!("Reconcile worker exited");
    });
    (tx, worker)
}
