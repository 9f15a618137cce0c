//! Data sources: anything that can produce one JSON-lines batch of event records.

pub mod file;
pub mod jsonl;
pub mod pubsub;
pub mod synthetic;

use crate::config::{GenerationConfig, SourceConfig, SourceOptions, StorageConfig};
use crate::constants;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub use file::FileSource;
pub use pubsub::PubSubSource;
pub use synthetic::SyntheticSource;

#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the batch and return the path of the JSONL file holding it.
    async fn generate(&self) -> Result<PathBuf>;

    /// Check that a generated file exists and is not empty.
    fn validate_output(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() == 0 {
            return Err(PipelineError::EmptyOutput(path.to_path_buf()));
        }
        info!(
            source = self.name(),
            path = %path.display(),
            size_mb = metadata.len() as f64 / (1024.0 * 1024.0),
            "output_validated"
        );
        Ok(())
    }
}

/// Everything a source factory gets to build its source
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
    /// Inline options merged with `source.config_file`
    pub options: SourceOptions,
}

pub type SourceFactory = Box<dyn Fn(SourceContext) -> Result<Box<dyn DataSource>> + Send + Sync>;

/// Registry of data source factories keyed by source name
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    /// Create a registry with the built-in sources
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(
            constants::PUBSUB_SOURCE,
            Box::new(|ctx| Ok(Box::new(PubSubSource::new(ctx)) as Box<dyn DataSource>)),
        );
        registry.register(
            constants::SYNTHETIC_SOURCE,
            Box::new(|ctx| Ok(Box::new(SyntheticSource::new(ctx)) as Box<dyn DataSource>)),
        );
        registry.register(
            constants::FILE_SOURCE,
            Box::new(|ctx| Ok(Box::new(FileSource::new(ctx)?) as Box<dyn DataSource>)),
        );
        registry
    }

    pub fn register(&mut self, name: &str, factory: SourceFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn build(&self, name: &str, ctx: SourceContext) -> Result<Box<dyn DataSource>> {
        match self.factories.get(name) {
            Some(factory) => factory(ctx),
            None => Err(PipelineError::UnknownSource {
                name: name.to_string(),
                available: self.list().join(", "),
            }),
        }
    }

    /// Registered source names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `<raw_data_path>/<prefix>_<YYYYmmdd_HHMMSS>.jsonl`, creating the directory.
pub fn timestamped_output_path(raw_data_path: &Path, prefix: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(raw_data_path)?;
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    Ok(raw_data_path.join(format!("{}_{}.jsonl", prefix, ts)))
}

/// Random lowercase alphanumeric identifier
pub fn random_message_id<R: Rng>(rng: &mut R, length: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(length)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Five-digit zipcode truncated to `digits`
pub fn random_zipcode<R: Rng>(rng: &mut R, digits: usize) -> String {
    let zip = rng.gen_range(10_000..=99_999).to_string();
    zip.chars().take(digits).collect()
}
