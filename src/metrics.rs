use std::net::SocketAddr;
use tracing::{info, warn};

pub const DEFAULT_METRICS_PORT: u16 = 9898;

/// Install the Prometheus exporter on `$PIPELINE_METRICS_PORT` (default 9898).
pub fn init_metrics() {
    let port: u16 = std::env::var("PIPELINE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
    PipelineMetrics::register_metrics();
}

/// Counters and histograms recorded by pipeline runs. Without an installed
/// recorder these are no-ops.
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_run_started() {
        ::metrics::counter!("pipeline_runs_started_total").increment(1);
    }

    pub fn record_run_success(duration_secs: f64) {
        ::metrics::counter!("pipeline_runs_success_total").increment(1);
        ::metrics::histogram!("pipeline_run_duration_seconds").record(duration_secs);
    }

    pub fn record_run_error() {
        ::metrics::counter!("pipeline_runs_error_total").increment(1);
    }

    pub fn record_generated(source: &str, records: u64) {
        ::metrics::counter!("pipeline_generated_records_total", "source" => source.to_string())
            .increment(records);
    }

    pub fn record_strategy(
        strategy: &str,
        input_records: u64,
        output_records: usize,
        duration_secs: f64,
    ) {
        let label = strategy.to_string();
        ::metrics::counter!("pipeline_strategy_input_records_total", "strategy" => label.clone())
            .increment(input_records);
        ::metrics::counter!("pipeline_strategy_output_records_total", "strategy" => label.clone())
            .increment(output_records as u64);
        ::metrics::histogram!("pipeline_strategy_duration_seconds", "strategy" => label)
            .record(duration_secs);
    }

    pub fn record_task_retry(task: &str) {
        ::metrics::counter!("pipeline_task_retries_total", "task" => task.to_string()).increment(1);
    }

    /// Pre-register so the series show up before the first run
    fn register_metrics() {
        let _ = ::metrics::counter!("pipeline_runs_started_total");
        let _ = ::metrics::counter!("pipeline_runs_success_total");
        let _ = ::metrics::counter!("pipeline_runs_error_total");
        let _ = ::metrics::histogram!("pipeline_run_duration_seconds");
    }
}
