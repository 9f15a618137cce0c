use anyhow::Context;
use clap::Parser;
use dedup_lab::config::{load_config, GenerationMode, RunOverrides, Scale, SourceType};
use dedup_lab::constants;
use dedup_lab::pipeline::driver::run_pipeline;
use dedup_lab::{logging, metrics, server};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dedup_lab")]
#[command(about = "Config-driven pub/sub ingestion and deduplication benchmarks")]
#[command(version)]
struct Cli {
    /// Pipeline config file (default: $PIPELINE_CONFIG or config/pipeline.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the source type: pubsub, synthetic or file
    #[arg(long)]
    source: Option<SourceType>,

    /// Override the generation mode: chaos or speed
    #[arg(long)]
    mode: Option<GenerationMode>,

    /// Override the scale: a record count or small, medium, large, xlarge
    #[arg(long, value_parser = parse_scale)]
    scale: Option<u64>,

    /// Input glob for the file source
    #[arg(long)]
    path: Option<String>,

    /// Serve HTTP triggers (and cron-scheduled runs) instead of running once
    #[arg(long)]
    serve: bool,

    /// Cron expression for scheduled runs in serve mode
    #[arg(long)]
    cron: Option<String>,

    /// HTTP port in serve mode (default: orchestration.server.port)
    #[arg(long)]
    port: Option<u16>,
}

fn parse_scale(s: &str) -> Result<u64, String> {
    constants::scale_preset(s)
        .or_else(|| s.parse().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            format!(
                "invalid scale '{}': use a positive integer or small, medium, large, xlarge",
                s
            )
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(&RunOverrides {
        source: cli.source,
        mode: cli.mode,
        scale: cli.scale.map(Scale),
        path: cli.path.clone(),
    });
    config.validate()?;

    let logging_config = &config.orchestration.logging;
    let _guard = logging::init_logging(&logging_config.resolved_level(), logging_config.structured);

    if cli.serve {
        let server_config = config.orchestration.server.clone();
        if !server_config.enabled {
            anyhow::bail!("Serve mode is disabled (orchestration.server.enabled = false)");
        }
        metrics::init_metrics();
        let port = cli.port.unwrap_or(server_config.port);
        let cron = cli.cron.or(server_config.cron);
        return server::start_server(config, port, cron)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e));
    }

    match run_pipeline(&config).await {
        Ok(summary) => {
            println!("\n📊 Pipeline Results for {}:", summary.pipeline);
            println!("   Source: {} ({})", summary.source, summary.generation_mode);
            println!(
                "   Input: {} ({} records)",
                summary.input_path.display(),
                summary.input_records
            );
            for report in &summary.strategies {
                println!("   {} -> {}", report.strategy, report.output_path.display());
                println!("      {}", report.metrics);
            }
            info!("Pipeline finished");
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(e.into())
        }
    }
}
