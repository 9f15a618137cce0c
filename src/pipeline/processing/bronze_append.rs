use super::{with_composite_hash, Strategy};
use crate::config::{BronzeAppendConfig, StorageConfig};
use crate::constants;
use crate::error::Result;
use crate::hashing::compute_payload_hash;
use crate::pipeline::storage::{write_table, TableCompression, WriteMode, WriteOptions};
use crate::types::{EventRecord, StrategyOutcome};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Immutable bronze layer: every record is kept, with composite hash,
/// payload hash and partition date attached, and appended to the table.
pub struct BronzeAppendStrategy {
    config: BronzeAppendConfig,
    base_path: PathBuf,
    compression: TableCompression,
}

impl BronzeAppendStrategy {
    pub fn new(config: BronzeAppendConfig, storage: &StorageConfig) -> Self {
        Self {
            config,
            base_path: storage.table_base_path.clone(),
            compression: storage.compression,
        }
    }
}

impl Strategy for BronzeAppendStrategy {
    fn name(&self) -> &str {
        constants::BRONZE_APPEND
    }

    fn table_name(&self) -> &str {
        constants::BRONZE_APPEND_TABLE
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn process(&self, records: Vec<EventRecord>) -> Result<StrategyOutcome> {
        let total = records.len();
        let algorithm = self.config.hash_algorithm;

        let mut batch = with_composite_hash(records, algorithm);
        for row in batch.iter_mut() {
            row.payload_hash = Some(compute_payload_hash(&row.record, algorithm)?);
            row.partition_date = row.record.created_date();
        }

        let unique_composite: HashSet<&str> =
            batch.iter().map(|r| r.composite_hash.as_str()).collect();
        let unique_payloads: HashSet<&str> =
            batch.iter().filter_map(|r| r.payload_hash.as_deref()).collect();
        let unique_composite = unique_composite.len();
        let unique_payloads = unique_payloads.len();

        let table_path = self.table_path();
        write_table(
            &table_path,
            &batch,
            &WriteOptions {
                mode: WriteMode::Append,
                partition_by: self.config.partition_by.clone(),
                compression: self.compression,
            },
        )?;

        let potential_duplicates = total - unique_composite;
        info!(
            strategy = self.name(),
            records = total,
            potential_dups = potential_duplicates,
            "bronze_append_completed"
        );

        Ok(StrategyOutcome {
            batch,
            metrics: json!({
                "strategy": self.name(),
                "total_records": total,
                "unique_composite_keys": unique_composite,
                "unique_payloads": unique_payloads,
                "potential_duplicates": potential_duplicates,
                "note": "No deduplication - immutable bronze pattern",
            }),
            output_path: table_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashAlgorithm;
    use crate::pipeline::storage::table_row_count;

    fn storage(dir: &Path) -> StorageConfig {
        StorageConfig {
            table_base_path: dir.to_path_buf(),
            ..StorageConfig::default()
        }
    }

    fn batch() -> Vec<EventRecord> {
        let mut a = EventRecord::new("m1", 1, 0, 1_704_067_200.0); // 2024-01-01
        a.value = Some(10);
        let mut changed = a.clone();
        changed.value = Some(11);
        let b = EventRecord::new("m2", 2, 1, 1_704_153_600.0); // 2024-01-02
        vec![a.clone(), a, changed, b]
    }

    #[test]
    fn test_keeps_everything_and_counts_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let strategy =
            BronzeAppendStrategy::new(BronzeAppendConfig::default(), &storage(dir.path()));

        let outcome = strategy.process(batch()).unwrap();

        assert_eq!(outcome.batch.len(), 4);
        assert_eq!(outcome.metrics["total_records"], 4);
        assert_eq!(outcome.metrics["unique_composite_keys"], 2);
        assert_eq!(outcome.metrics["unique_payloads"], 3);
        assert_eq!(outcome.metrics["potential_duplicates"], 2);
        assert!(outcome.batch.iter().all(|r| r.payload_hash.is_some()));
        assert!(outcome.output_path.join("partition_date=2024-01-01").is_dir());
        assert!(outcome.output_path.join("partition_date=2024-01-02").is_dir());
    }

    #[test]
    fn test_repeated_runs_append() {
        let dir = tempfile::tempdir().unwrap();
        let strategy =
            BronzeAppendStrategy::new(BronzeAppendConfig::default(), &storage(dir.path()));

        strategy.process(batch()).unwrap();
        let outcome = strategy.process(batch()).unwrap();
        assert_eq!(table_row_count(&outcome.output_path).unwrap(), 8);
    }

    #[test]
    fn test_md5_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let config = BronzeAppendConfig {
            partition_by: vec![],
            hash_algorithm: HashAlgorithm::Md5,
        };
        let outcome = BronzeAppendStrategy::new(config, &storage(dir.path()))
            .process(batch())
            .unwrap();
        assert!(outcome.batch.iter().all(|r| r.composite_hash.len() == 32));
    }
}
