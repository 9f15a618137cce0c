use super::{with_composite_hash, Strategy};
use crate::config::{EagerDedupConfig, StorageConfig};
use crate::constants;
use crate::error::Result;
use crate::pipeline::storage::{write_table, TableCompression, WriteOptions};
use crate::types::{EventRecord, StrategyOutcome};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Drop repeated composite hashes before writing, keeping the first arrival.
pub struct EagerDedupStrategy {
    config: EagerDedupConfig,
    base_path: PathBuf,
    compression: TableCompression,
}

impl EagerDedupStrategy {
    pub fn new(config: EagerDedupConfig, storage: &StorageConfig) -> Self {
        Self {
            config,
            base_path: storage.table_base_path.clone(),
            compression: storage.compression,
        }
    }
}

/// Percentage of dropped rows, rounded to two decimals
pub fn dedup_rate_pct(initial: usize, final_count: usize) -> f64 {
    if initial == 0 {
        return 0.0;
    }
    let pct = (initial - final_count) as f64 / initial as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

impl Strategy for EagerDedupStrategy {
    fn name(&self) -> &str {
        constants::EAGER_DEDUP
    }

    fn table_name(&self) -> &str {
        constants::EAGER_DEDUP_TABLE
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn process(&self, records: Vec<EventRecord>) -> Result<StrategyOutcome> {
        let initial = records.len();

        let mut seen = HashSet::with_capacity(initial);
        let batch: Vec<_> = with_composite_hash(records, self.config.hash_algorithm)
            .into_iter()
            .filter(|row| seen.insert(row.composite_hash.clone()))
            .collect();
        let final_count = batch.len();

        let table_path = self.table_path();
        write_table(
            &table_path,
            &batch,
            &WriteOptions {
                mode: self.config.write_mode,
                partition_by: Vec::new(),
                compression: self.compression,
            },
        )?;

        let rate = dedup_rate_pct(initial, final_count);
        info!(
            strategy = self.name(),
            dropped = initial - final_count,
            rate_pct = rate,
            "eager_dedup_completed"
        );

        Ok(StrategyOutcome {
            batch,
            metrics: json!({
                "strategy": self.name(),
                "initial_records": initial,
                "final_records": final_count,
                "dropped_duplicates": initial - final_count,
                "dedup_rate_pct": rate,
            }),
            output_path: table_path,
        })
    }
}
