use super::{ensure_column, with_composite_hash, Strategy};
use crate::config::{KeepPolicy, LastWriteWinsConfig, StorageConfig};
use crate::constants;
use crate::error::Result;
use crate::hashing::HashAlgorithm;
use crate::pipeline::storage::{write_table, TableCompression, WriteMode, WriteOptions};
use crate::types::{compare_values, key_string, EventRecord, StrategyOutcome};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sort by a timestamp column and keep one record per key, then overwrite
/// the table. Output rows stay in sort order.
pub struct LastWriteWinsStrategy {
    config: LastWriteWinsConfig,
    base_path: PathBuf,
    compression: TableCompression,
}

impl LastWriteWinsStrategy {
    pub fn new(config: LastWriteWinsConfig, storage: &StorageConfig) -> Self {
        Self {
            config,
            base_path: storage.table_base_path.clone(),
            compression: storage.compression,
        }
    }
}

impl Strategy for LastWriteWinsStrategy {
    fn name(&self) -> &str {
        constants::LAST_WRITE_WINS
    }

    fn table_name(&self) -> &str {
        constants::LAST_WRITE_WINS_TABLE
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn process(&self, records: Vec<EventRecord>) -> Result<StrategyOutcome> {
        let initial = records.len();
        let dedup_key = &self.config.dedup_key;
        let sort_by = &self.config.sort_by;

        let mut sorted = with_composite_hash(records, HashAlgorithm::Sha256);
        ensure_column(dedup_key, &sorted)?;
        ensure_column(sort_by, &sorted)?;

        // Stable: ties keep arrival order
        sorted.sort_by(|a, b| compare_values(&a.column(sort_by), &b.column(sort_by)));

        let mut winner: HashMap<String, usize> = HashMap::new();
        for (idx, row) in sorted.iter().enumerate() {
            let key = key_string(&row.column(dedup_key));
            match self.config.keep {
                KeepPolicy::First => {
                    winner.entry(key).or_insert(idx);
                }
                KeepPolicy::Last => {
                    winner.insert(key, idx);
                }
            }
        }

        let mut keep = vec![false; sorted.len()];
        for idx in winner.into_values() {
            keep[idx] = true;
        }
        let batch: Vec<_> = sorted
            .into_iter()
            .zip(keep)
            .filter_map(|(row, kept)| kept.then_some(row))
            .collect();
        let final_count = batch.len();

        let table_path = self.table_path();
        write_table(
            &table_path,
            &batch,
            &WriteOptions {
                mode: WriteMode::Overwrite,
                partition_by: Vec::new(),
                compression: self.compression,
            },
        )?;

        info!(
            strategy = self.name(),
            merged = initial - final_count,
            dedup_key = %dedup_key,
            "last_write_wins_completed"
        );

        Ok(StrategyOutcome {
            batch,
            metrics: json!({
                "strategy": self.name(),
                "initial_records": initial,
                "final_records": final_count,
                "merged_duplicates": initial - final_count,
                "dedup_method": format!("last-write-wins by {}", dedup_key),
            }),
            output_path: table_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn storage(dir: &Path) -> StorageConfig {
        StorageConfig {
            table_base_path: dir.to_path_buf(),
            ..StorageConfig::default()
        }
    }

    fn event(id: &str, seq: i64, created_at: f64, value: i64) -> EventRecord {
        let mut r = EventRecord::new(id, seq, 0, created_at);
        r.value = Some(value);
        r
    }

    fn batch() -> Vec<EventRecord> {
        // Arrival order disagrees with created_at for "a"
        vec![
            event("a", 1, 5.0, 500),
            event("b", 2, 2.0, 200),
            event("a", 1, 1.0, 100),
            event("c", 3, 3.0, 300),
            event("a", 1, 4.0, 400),
        ]
    }

    #[test]
    fn test_keeps_latest_by_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let strategy =
            LastWriteWinsStrategy::new(LastWriteWinsConfig::default(), &storage(dir.path()));
        let outcome = strategy.process(batch()).unwrap();

        assert_eq!(outcome.batch.len(), 3);
        let a = outcome.batch.iter().find(|r| r.record.message_id == "a").unwrap();
        assert_eq!(a.record.value, Some(500));

        let order: Vec<f64> = outcome.batch.iter().map(|r| r.record.created_at).collect();
        assert_eq!(order, vec![2.0, 3.0, 5.0]);

        assert_eq!(outcome.metrics["initial_records"], 5);
        assert_eq!(outcome.metrics["final_records"], 3);
        assert_eq!(outcome.metrics["merged_duplicates"], 2);
        assert_eq!(outcome.metrics["dedup_method"], "last-write-wins by message_id");
    }

    #[test]
    fn test_keep_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = LastWriteWinsConfig {
            keep: KeepPolicy::First,
            ..LastWriteWinsConfig::default()
        };
        let outcome = LastWriteWinsStrategy::new(config, &storage(dir.path()))
            .process(batch())
            .unwrap();
        let a = outcome.batch.iter().find(|r| r.record.message_id == "a").unwrap();
        assert_eq!(a.record.value, Some(100));
    }

    #[test]
    fn test_overwrites_table() {
        let dir = tempfile::tempdir().unwrap();
        let strategy =
            LastWriteWinsStrategy::new(LastWriteWinsConfig::default(), &storage(dir.path()));
        strategy.process(batch()).unwrap();
        let outcome = strategy.process(batch()).unwrap();
        assert_eq!(
            crate::pipeline::storage::table_row_count(&outcome.output_path).unwrap(),
            3
        );
    }

    #[test]
    fn test_unknown_dedup_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = LastWriteWinsConfig {
            dedup_key: "nope".to_string(),
            ..LastWriteWinsConfig::default()
        };
        let err = LastWriteWinsStrategy::new(config, &storage(dir.path()))
            .process(batch())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn(_)));
    }
}
