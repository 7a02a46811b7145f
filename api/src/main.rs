// Host binary: wires the repository, ConfigStore adapter, registry,
// scheduler, reconciler and REST surface into one process.

use std::sync::Arc;

use api::routes::create_router;
use api::state::AppState;
use async_trait::async_trait;
use common::config::Settings;
use common::configstore::{ConfigClient, ConfigStoreBackend, HttpConfigStore, InMemoryConfigStore};
use common::db::repositories::{JobRepository, PgJobRepository};
use common::db::DbPool;
use common::errors::ExecutionError;
use common::executor::{JobContext, JobExecutor};
use common::reconciler::{spawn_reconcile_worker, ConfigChangeReconciler};
use common::registry::{HandlerRegistry, Job, JobRegistry, JobSpec};
use common::scheduler::{CronTriggerEngine, SchedulerManager, TriggerEngine};
use common::telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Built-in liveness job. Registered stopped; operators start it when they
/// want a periodic heartbeat in the execution log.
struct HeartbeatJob;

#[async_trait]
impl Job for HeartbeatJob {
    async fn execute(&self, ctx: &JobContext) -> Result<(), ExecutionError> {
        ctx.log("heartbeat");
        Ok(())
    }
}

fn register_builtin_jobs(handlers: &HandlerRegistry) {
    handlers.register(
        "builtin.heartbeat",
        Arc::new(HeartbeatJob),
        Some(
            JobSpec::new("heartbeat")
                .cron("0 * * * * ?")
                .description("Built-in liveness job")
                .auto_start(false),
        ),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    telemetry::init_logging(&settings.observability.log_level)?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        environment = %settings.environment,
        database_url = %settings.database.url,
        config_store = %settings.config_store.server_addr,
        "Starting job center"
    );

    let metrics = match telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    // Persistence
    let db_pool = DbPool::new(&settings.database).await?;
    let repository: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(db_pool));

    // ConfigStore adapter. Without a configured endpoint the process runs
    // standalone against an in-memory store: documents still round-trip and
    // listeners still fire, they just do not leave the process.
    let backend: Arc<dyn ConfigStoreBackend> = if settings.config_store.server_addr.is_empty() {
        info!("No ConfigStore endpoint configured, using the in-process store");
        Arc::new(InMemoryConfigStore::new())
    } else {
        Arc::new(HttpConfigStore::new(&settings.config_store)?)
    };
    let config_client = Arc::new(ConfigClient::new(backend, &settings.config_store));
    config_client.refresh().await;

    // Registration table and execution machinery
    let handlers = Arc::new(HandlerRegistry::new());
    register_builtin_jobs(&handlers);

    let shutdown = CancellationToken::new();
    let executor = Arc::new(JobExecutor::with_shutdown(
        repository.clone(),
        handlers.clone(),
        shutdown.clone(),
    ));

    let engine: Arc<dyn TriggerEngine> = Arc::new(CronTriggerEngine::new());
    let scheduler = Arc::new(SchedulerManager::new(executor.clone()).with_engine(engine));

    // Reconciliation worker: ConfigStore callbacks enqueue here and are
    // processed serially in receive order.
    let reconciler = Arc::new(ConfigChangeReconciler::new(
        repository.clone(),
        scheduler.clone(),
    ));
    let (reconcile_tx, _reconcile_worker) = spawn_reconcile_worker(reconciler);

    // Startup sweep: merge registrations with the database, publish
    // documents, subscribe the reconciler, schedule running jobs.
    let registry = JobRegistry::new(
        repository.clone(),
        config_client.clone(),
        scheduler.clone(),
        handlers.clone(),
        settings.environment.clone(),
        reconcile_tx,
    );
    registry.register_all().await;

    let state = AppState {
        repository,
        scheduler: scheduler.clone(),
        executor,
        environment: settings.environment.clone(),
        metrics,
    };

    let app = create_router(state);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Management API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            scheduler,
            config_client,
            shutdown,
            settings.scheduler.shutdown_grace_seconds,
        ))
        .await?;

    info!("Job center stopped");
    Ok(())
}

/// Resolves when ctrl-c arrives, after stopping the scheduler, cancelling
/// retry sleeps, and releasing ConfigStore listeners. In-flight fires get a
/// grace period to finish.
async fn shutdown_signal(
    scheduler: Arc<SchedulerManager>,
    config_client: Arc<ConfigClient>,
    shutdown: CancellationToken,
    grace_seconds: u64,
) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    info!("Shutdown signal received");
    scheduler.shutdown();
    shutdown.cancel();
    config_client.shutdown().await;
    tokio::time::sleep(std::time::Duration::from_secs(grace_seconds)).await;
}
