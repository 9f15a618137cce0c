use crate::config::Config;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::pipeline::monitoring::{format_performance_table, PerformanceMetrics};
use crate::pipeline::retention::prune_raw_files;
use crate::pipeline::tasks::{
    generate_data_task, process_strategy_task, with_retries, StrategyReport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub pipeline: String,
    pub source: String,
    pub generation_mode: String,
    pub input_path: PathBuf,
    pub input_records: u64,
    pub strategies: Vec<StrategyReport>,
    pub started_at: DateTime<Utc>,
    pub duration_s: f64,
}

impl PipelineSummary {
    pub fn performance(&self) -> Vec<PerformanceMetrics> {
        self.strategies.iter().map(|s| s.performance.clone()).collect()
    }
}

/// Generate one batch and run every enabled strategy over it, in order.
pub async fn run_pipeline(config: &Config) -> Result<PipelineSummary> {
    PipelineMetrics::record_run_started();
    let start = Instant::now();
    match run(config).await {
        Ok(summary) => {
            PipelineMetrics::record_run_success(start.elapsed().as_secs_f64());
            Ok(summary)
        }
        Err(e) => {
            error!(error = %e, "pipeline_failed");
            PipelineMetrics::record_run_error();
            Err(e)
        }
    }
}

async fn run(config: &Config) -> Result<PipelineSummary> {
    config.validate()?;
    let started_at = Utc::now();
    let start = Instant::now();
    let execution = &config.orchestration.execution;
    let delay = Duration::from_secs(execution.retry_delay_seconds);

    info!(
        pipeline = %config.pipeline.name,
        version = %config.pipeline.version,
        source = config.source.source_type.as_str(),
        strategies = ?config.strategies.enabled,
        "pipeline_starting"
    );

    prune_raw_files(&config.storage.raw_data_path, config.storage.retention_days)?;

    let generated = with_retries("generate_data", execution.generate_retries, delay, || {
        generate_data_task(config)
    })
    .await?;

    let mut reports = Vec::with_capacity(config.strategies.enabled.len());
    for name in &config.strategies.enabled {
        let report = with_retries(name, execution.max_retries, delay, || {
            process_strategy_task(&generated.path, name, config, generated.records)
        })
        .await?;
        info!(strategy = %name, metrics = %report.metrics, "strategy_completed");
        reports.push(report);
    }

    let summary = PipelineSummary {
        pipeline: config.pipeline.name.clone(),
        source: config.source.source_type.as_str().to_string(),
        generation_mode: config.generation.mode.as_str().to_string(),
        input_path: generated.path,
        input_records: generated.records,
        strategies: reports,
        started_at,
        duration_s: start.elapsed().as_secs_f64(),
    };

    if summary.strategies.len() > 1 {
        println!("{}", format_performance_table(&summary.performance()));
    }
    info!(
        input_records = summary.input_records,
        strategies = summary.strategies.len(),
        duration_s = %format!("{:.3}", summary.duration_s),
        "pipeline_completed"
    );
    Ok(summary)
}
