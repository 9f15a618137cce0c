use anyhow::Result;
use arrow::array::{Array, Int64Array};
use dedup_lab::config::Config;
use dedup_lab::pipeline::driver::run_pipeline;
use dedup_lab::pipeline::storage::{read_commit_log, table_row_count};
use dedup_lab::PipelineError;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;
use tempfile::tempdir;

const INPUT: &str = r#"{"message_id":"m1","sequence_id":1,"partition_id":0,"created_at":1.0,"value":10,"zipcode":"98101"}
{"message_id":"m1","sequence_id":1,"partition_id":0,"created_at":1.0,"value":10,"zipcode":"98101"}
{"message_id":"m2","sequence_id":2,"partition_id":1,"created_at":2.0,"value":20,"zipcode":"98102"}
{"message_id":"m3","sequence_id":3,"partition_id":0,"created_at":3.0,"value":30,"zipcode":"98103"}
{"message_id":"m2","sequence_id":2,"partition_id":1,"created_at":5.0,"value":99,"zipcode":"98102"}
"#;

fn config_yaml(root: &Path, source: &str, extra: &str) -> String {
    format!(
        r#"
source:
  type: {source}
{extra}
generation:
  scale: 200
  mode: speed
  chaos:
    dup_prob: 0.1
    slow_prob: 0.0
strategies:
  enabled: [bronze_append, last_write_wins, eager_dedup]
storage:
  raw_data_path: {raw}
  table_base_path: {tables}
orchestration:
  execution:
    max_retries: 0
    generate_retries: 0
    retry_delay_seconds: 0
"#,
        source = source,
        extra = extra,
        raw = root.join("raw").display(),
        tables = root.join("tables").display(),
    )
}

/// Values of one Int64 column across every data file of a table
fn int_column(table: &Path, column: &str) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    for entry in glob::glob(&format!("{}/**/*.parquet", table.display()))? {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(entry?)?)?.build()?;
        for batch in reader {
            let batch = batch?;
            let array = batch
                .column_by_name(column)
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .expect("int64 column");
            values.extend((0..array.len()).filter(|i| array.is_valid(*i)).map(|i| array.value(i)));
        }
    }
    values.sort();
    Ok(values)
}

#[tokio::test]
async fn test_file_source_runs_every_strategy() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("events.jsonl");
    std::fs::write(&input, INPUT)?;

    let yaml = config_yaml(
        temp_dir.path(),
        "file",
        &format!("  path: {}", input.display()),
    );
    let config = Config::from_yaml_str(&yaml)?;

    let summary = run_pipeline(&config).await?;

    assert_eq!(summary.source, "file");
    assert_eq!(summary.input_path, input);
    assert_eq!(summary.input_records, 5);
    assert_eq!(summary.strategies.len(), 3);

    let bronze = &summary.strategies[0];
    assert_eq!(bronze.strategy, "bronze_append");
    assert_eq!(bronze.metrics["total_records"], 5);
    assert_eq!(bronze.metrics["unique_composite_keys"], 3);
    assert_eq!(bronze.metrics["unique_payloads"], 4);
    assert_eq!(bronze.metrics["potential_duplicates"], 2);
    assert_eq!(table_row_count(&bronze.output_path)?, 5);
    assert!(bronze.output_path.join("partition_date=1970-01-01").is_dir());

    let lww = &summary.strategies[1];
    assert_eq!(lww.strategy, "last_write_wins");
    assert_eq!(lww.metrics["final_records"], 3);
    assert_eq!(lww.metrics["merged_duplicates"], 2);
    assert_eq!(int_column(&lww.output_path, "value")?, vec![10, 30, 99]);

    let eager = &summary.strategies[2];
    assert_eq!(eager.strategy, "eager_dedup");
    assert_eq!(eager.metrics["final_records"], 3);
    assert_eq!(eager.metrics["dropped_duplicates"], 2);
    assert_eq!(eager.metrics["dedup_rate_pct"], 40.0);
    assert_eq!(int_column(&eager.output_path, "value")?, vec![10, 20, 30]);

    for report in &summary.strategies {
        assert_eq!(report.performance.record_count, 5);
        assert!(report.performance.disk_size_mb.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn test_repeated_runs_append_bronze_and_overwrite_others() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("events.jsonl");
    std::fs::write(&input, INPUT)?;
    let config = Config::from_yaml_str(&config_yaml(
        temp_dir.path(),
        "file",
        &format!("  path: {}", input.display()),
    ))?;

    run_pipeline(&config).await?;
    let summary = run_pipeline(&config).await?;

    let bronze = &summary.strategies[0].output_path;
    assert_eq!(table_row_count(bronze)?, 10);
    assert_eq!(read_commit_log(bronze)?.len(), 2);

    let lww = &summary.strategies[1].output_path;
    assert_eq!(table_row_count(lww)?, 3);
    assert_eq!(read_commit_log(lww)?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_synthetic_source_end_to_end() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = Config::from_yaml_str(&config_yaml(temp_dir.path(), "synthetic", ""))?;

    let summary = run_pipeline(&config).await?;

    assert_eq!(summary.input_records, 220);
    assert!(summary.input_path.starts_with(temp_dir.path().join("raw")));
    let eager = &summary.strategies[2];
    assert_eq!(eager.metrics["final_records"], 200);
    assert_eq!(eager.metrics["dropped_duplicates"], 20);
    Ok(())
}

#[tokio::test]
async fn test_pubsub_source_in_speed_mode() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = Config::from_yaml_str(&config_yaml(temp_dir.path(), "pubsub", ""))?;

    let summary = run_pipeline(&config).await?;

    assert_eq!(summary.generation_mode, "speed");
    assert!(summary.input_records >= 200);
    let eager = &summary.strategies[2];
    assert_eq!(eager.metrics["final_records"], 200);

    let first_line = std::fs::read_to_string(&summary.input_path)?
        .lines()
        .next()
        .map(str::to_string)
        .unwrap_or_default();
    let first: serde_json::Value = serde_json::from_str(&first_line)?;
    assert_eq!(first["event"], "message_received");
    assert_eq!(first["arrival_index"], 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_input_fails_the_run() -> Result<()> {
    let temp_dir = tempdir()?;
    let pattern = temp_dir.path().join("nothing/*.jsonl");
    let config = Config::from_yaml_str(&config_yaml(
        temp_dir.path(),
        "file",
        &format!("  path: {}", pattern.display()),
    ))?;

    let err = run_pipeline(&config).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoInputFiles(_)));
    Ok(())
}

#[test]
fn test_example_config_loads() -> Result<()> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = dedup_lab::load_config(Some(&manifest.join("config/pipeline.yaml")))?;
    assert_eq!(config.generation.scale.0, 10_000);
    assert_eq!(config.strategies.enabled.len(), 3);
    assert_eq!(config.orchestration.server.port, 4200);
    Ok(())
}
