//! Retriable units of work the driver composes into a run.

use crate::config::{merge_source_options, Config};
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::pipeline::ingestion::{jsonl, SourceContext, SourceRegistry};
use crate::pipeline::monitoring::{monitor_performance, PerformanceMetrics};
use crate::pipeline::processing::StrategyRegistry;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedData {
    pub path: PathBuf,
    pub records: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: String,
    pub metrics: Value,
    pub performance: PerformanceMetrics,
    pub output_path: PathBuf,
}

/// Run `op` up to `retries + 1` times with a fixed delay between attempts.
/// The last error is returned when every attempt fails.
pub async fn with_retries<T, F, Fut>(
    task: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = retries + 1;
    let mut attempt = 0u32;
    let strategy = FixedInterval::new(delay).take(retries as usize);

    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let fut = op();
        async move {
            let result = fut.await;
            if let Err(e) = &result {
                if current < attempts {
                    warn!(
                        task,
                        attempt = current,
                        attempts,
                        error = %e,
                        "Task failed, retrying in {}s",
                        delay.as_secs_f64()
                    );
                    PipelineMetrics::record_task_retry(task);
                } else {
                    warn!(task, attempts, error = %e, "Task failed, giving up");
                }
            }
            result
        }
    })
    .await
}

/// Build the configured source, produce one batch and count its records.
pub async fn generate_data_task(config: &Config) -> Result<GeneratedData> {
    let options = merge_source_options(config)?;
    let source_name = config.source.source_type.as_str();
    let ctx = SourceContext {
        generation: config.generation.clone(),
        storage: config.storage.clone(),
        source: config.source.clone(),
        options,
    };
    let source = SourceRegistry::new().build(source_name, ctx)?;

    info!(
        source = source_name,
        scale = config.generation.scale.0,
        mode = config.generation.mode.as_str(),
        "generating_data"
    );
    let path = source.generate().await?;
    let count_path = path.clone();
    let records = tokio::task::spawn_blocking(move || jsonl::count_records(&count_path))
        .await
        .map_err(|e| PipelineError::Task {
            task: "count_records".to_string(),
            message: e.to_string(),
        })??;

    PipelineMetrics::record_generated(source_name, records);
    info!(path = %path.display(), records, "data_generated");
    Ok(GeneratedData { path, records })
}

/// Load the batch and run one strategy over it under the performance monitor.
/// Runs on the blocking pool since reading, hashing and writing are CPU and
/// disk bound.
pub async fn process_strategy_task(
    input: &Path,
    strategy_name: &str,
    config: &Config,
    record_count: u64,
) -> Result<StrategyReport> {
    let input = input.to_path_buf();
    let name = strategy_name.to_string();
    let strategies = config.strategies.clone();
    let storage = config.storage.clone();

    tokio::task::spawn_blocking(move || -> Result<StrategyReport> {
        let strategy = StrategyRegistry::new().build(&name, &strategies, &storage)?;
        let records = jsonl::read_records(&input)?;
        info!(strategy = %name, records = records.len(), "processing_strategy");

        let table_path = strategy.table_path();
        let (outcome, performance) =
            monitor_performance(&name, record_count, Some(&table_path), || {
                strategy.process(records)
            })?;

        PipelineMetrics::record_strategy(
            &name,
            record_count,
            outcome.batch.len(),
            performance.execution_time_s,
        );
        Ok(StrategyReport {
            strategy: name,
            metrics: outcome.metrics,
            performance,
            output_path: outcome.output_path,
        })
    })
    .await
    .map_err(|e| PipelineError::Task {
        task: strategy_name.to_string(),
        message: e.to_string(),
    })?
}
