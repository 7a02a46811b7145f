// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting.
///
/// Log levels come from RUST_LOG when set, otherwise from configuration.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level, "Structured logging initialized");
    Ok(())
}

/// Install the Prometheus metrics recorder and register metric
/// descriptions:
/// - job_executions_total: counter for fires by terminal status
/// - job_execution_duration_seconds: histogram of fire durations
/// - config_reconciliations_total: counter for processed ConfigStore pushes
///
/// The returned handle renders the scrape payload for the /metrics route.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!(
        "job_executions_total",
        "Total number of job fires by terminal status"
    );
    describe_histogram!(
        "job_execution_duration_seconds",
        "Duration of job fires in seconds"
    );
    describe_counter!(
        "config_reconciliations_total",
        "Total number of processed ConfigStore pushes"
    );

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Record a finished fire.
#[inline]
pub fn record_execution(job_name: &str, success: bool, duration_seconds: f64) {
    let status = if success { "success" } else { "failed" };
    counter!("job_executions_total", "job_name" => job_name.to_string(), "status" => status)
        .increment(1);
    histogram!("job_execution_duration_seconds", "job_name" => job_name.to_string())
        .record(duration_seconds);
}

/// Record one processed ConfigStore push.
#[inline]
pub fn record_reconciliation(outcome: &'static str) {
    counter!("config_reconciliations_total", "outcome" => outcome).increment(1);
}
