//! Deduplication strategies: each takes one batch, attaches hash columns,
//! deduplicates (or not) and writes its own table.

pub mod bronze_append;
pub mod eager_dedup;
pub mod last_write_wins;

use crate::config::{StorageConfig, StrategiesConfig};
use crate::constants;
use crate::error::{PipelineError, Result};
use crate::hashing::{compute_composite_hash, HashAlgorithm};
use crate::types::{EventRecord, ProcessedRecord, StrategyOutcome, RECORD_COLUMNS};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use bronze_append::BronzeAppendStrategy;
pub use eager_dedup::EagerDedupStrategy;
pub use last_write_wins::LastWriteWinsStrategy;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Directory name of the output table
    fn table_name(&self) -> &str;

    fn base_path(&self) -> &Path;

    fn table_path(&self) -> PathBuf {
        self.base_path().join(self.table_name())
    }

    fn process(&self, records: Vec<EventRecord>) -> Result<StrategyOutcome>;
}

pub type StrategyFactory =
    Box<dyn Fn(&StrategiesConfig, &StorageConfig) -> Box<dyn Strategy> + Send + Sync>;

/// Registry of strategy factories keyed by strategy name
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(
            constants::BRONZE_APPEND,
            Box::new(|strategies, storage| {
                Box::new(BronzeAppendStrategy::new(strategies.bronze_append.clone(), storage))
            }),
        );
        registry.register(
            constants::LAST_WRITE_WINS,
            Box::new(|strategies, storage| {
                Box::new(LastWriteWinsStrategy::new(strategies.last_write_wins.clone(), storage))
            }),
        );
        registry.register(
            constants::EAGER_DEDUP,
            Box::new(|strategies, storage| {
                Box::new(EagerDedupStrategy::new(strategies.eager_dedup.clone(), storage))
            }),
        );
        registry
    }

    pub fn register(&mut self, name: &str, factory: StrategyFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn build(
        &self,
        name: &str,
        strategies: &StrategiesConfig,
        storage: &StorageConfig,
    ) -> Result<Box<dyn Strategy>> {
        self.factories
            .get(name)
            .map(|factory| factory(strategies, storage))
            .ok_or_else(|| PipelineError::UnknownStrategy {
                name: name.to_string(),
                available: self.list().join(", "),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered strategy names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach the composite hash to every record, keeping order.
pub fn with_composite_hash(
    records: Vec<EventRecord>,
    algorithm: HashAlgorithm,
) -> Vec<ProcessedRecord> {
    records
        .into_iter()
        .map(|record| {
            let hash = compute_composite_hash(&record, algorithm);
            ProcessedRecord::new(record, hash)
        })
        .collect()
}

/// A column is usable if it is a record field, the composite hash, or an
/// extra field present in at least one record.
pub fn ensure_column(name: &str, records: &[ProcessedRecord]) -> Result<()> {
    let known = RECORD_COLUMNS.contains(&name)
        || name == "composite_hash"
        || records.iter().any(|r| r.record.extra.contains_key(name));
    if known {
        Ok(())
    } else {
        Err(PipelineError::UnknownColumn(name.to_string()))
    }
}
