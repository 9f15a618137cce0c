use crate::constants;
use crate::error::{PipelineError, Result};
use crate::hashing::HashAlgorithm;
use crate::pipeline::storage::{TableCompression, WriteMode};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid interpolation pattern")
});

/// Complete pipeline configuration. Every section has defaults, so an empty
/// document describes a runnable pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineInfo,
    pub source: SourceConfig,
    pub generation: GenerationConfig,
    pub strategies: StrategiesConfig,
    pub storage: StorageConfig,
    #[serde(alias = "prefect")]
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInfo {
    pub name: String,
    pub version: String,
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            name: "configdriven-pipeline".to_string(),
            version: "1.0".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Pubsub,
    #[serde(alias = "polars_synthetic")]
    Synthetic,
    File,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pubsub => constants::PUBSUB_SOURCE,
            SourceType::Synthetic => constants::SYNTHETIC_SOURCE,
            SourceType::File => constants::FILE_SOURCE,
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            constants::PUBSUB_SOURCE => Ok(SourceType::Pubsub),
            constants::SYNTHETIC_SOURCE | "polars_synthetic" => Ok(SourceType::Synthetic),
            constants::FILE_SOURCE => Ok(SourceType::File),
            other => Err(format!(
                "unknown source type '{}' (expected pubsub, synthetic or file)",
                other
            )),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Optional YAML file whose top-level sections replace the inline options
    pub config_file: Option<PathBuf>,
    /// Input glob for the file source
    pub path: Option<String>,
    #[serde(flatten)]
    pub options: SourceOptions,
}

/// Per-source knobs, either inline under `source:` or in `source.config_file`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    pub pubsub: PubSubOptions,
    pub file: FileOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubOptions {
    pub partitions: u32,
    pub buffer_size: usize,
    pub log_interval: u64,
    pub slow_path_delay_ms: u64,
    pub message: MessageOptions,
}

impl Default for PubSubOptions {
    fn default() -> Self {
        Self {
            partitions: 3,
            buffer_size: 100,
            log_interval: 10_000,
            slow_path_delay_ms: 200,
            message: MessageOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageOptions {
    pub id_length: usize,
    pub value_range: [i64; 2],
    pub zipcode_digits: usize,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            id_length: 8,
            value_range: [100, 10_000],
            zipcode_digits: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub schema: FileSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSchema {
    pub required_fields: Vec<String>,
}

impl Default for FileSchema {
    fn default() -> Self {
        Self {
            required_fields: constants::default_required_fields(),
        }
    }
}

impl SourceOptions {
    pub fn validate(&self) -> Result<()> {
        let pubsub = &self.pubsub;
        if pubsub.partitions == 0 {
            return Err(PipelineError::Config("pubsub.partitions must be at least 1".into()));
        }
        if pubsub.buffer_size == 0 {
            return Err(PipelineError::Config("pubsub.buffer_size must be at least 1".into()));
        }
        if pubsub.message.id_length == 0 {
            return Err(PipelineError::Config("pubsub.message.id_length must be at least 1".into()));
        }
        let [lo, hi] = pubsub.message.value_range;
        if lo > hi {
            return Err(PipelineError::Config(format!(
                "pubsub.message.value_range must be [low, high], got [{}, {}]",
                lo, hi
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Realistic simulation with delays
    #[default]
    Chaos,
    /// No simulated delays
    Speed,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Chaos => "chaos",
            GenerationMode::Speed => "speed",
        }
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chaos" => Ok(GenerationMode::Chaos),
            "speed" => Ok(GenerationMode::Speed),
            other => Err(format!("unknown mode '{}' (expected chaos or speed)", other)),
        }
    }
}

/// Number of records to generate. Accepts an integer or one of the presets
/// `small`, `medium`, `large`, `xlarge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Scale(pub u64);

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Scale(n)),
            Raw::Named(name) => constants::scale_preset(&name)
                .or_else(|| name.trim().parse().ok())
                .map(Scale)
                .ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown scale '{}' (expected small, medium, large, xlarge or an integer)",
                        name
                    ))
                }),
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale(10_000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub scale: Scale,
    /// `null` seeds from entropy
    pub seed: Option<u64>,
    pub mode: GenerationMode,
    pub chaos: ChaosConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            scale: Scale::default(),
            seed: Some(42),
            mode: GenerationMode::default(),
            chaos: ChaosConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosMode {
    #[default]
    Fixed,
    Random,
}

/// A chaos knob: either an exact value or a `[lo, hi]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChaosValue {
    Fixed(f64),
    Range([f64; 2]),
}

impl ChaosValue {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            ChaosValue::Fixed(v) => (v, v),
            ChaosValue::Range([lo, hi]) => (lo, hi),
        }
    }

    /// Exact value, or the lower bound of a range
    pub fn fixed(&self) -> f64 {
        self.bounds().0
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match *self {
            ChaosValue::Fixed(v) => v,
            ChaosValue::Range([lo, hi]) if lo < hi => rng.gen_range(lo..=hi),
            ChaosValue::Range([lo, _]) => lo,
        }
    }
}

/// Chaos parameters resolved for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChaosParams {
    pub dup_prob: f64,
    pub slow_prob: f64,
    pub base_delay: f64,
    pub jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub mode: ChaosMode,
    pub dup_prob: ChaosValue,
    pub slow_prob: ChaosValue,
    pub base_delay: ChaosValue,
    pub jitter: ChaosValue,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            mode: ChaosMode::Fixed,
            dup_prob: ChaosValue::Fixed(0.10),
            slow_prob: ChaosValue::Fixed(0.10),
            base_delay: ChaosValue::Fixed(0.01),
            jitter: ChaosValue::Fixed(0.02),
        }
    }
}

impl ChaosConfig {
    /// Resolve the values used for one pipeline run.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ChaosParams {
        match self.mode {
            ChaosMode::Fixed => ChaosParams {
                dup_prob: self.dup_prob.fixed(),
                slow_prob: self.slow_prob.fixed(),
                base_delay: self.base_delay.fixed(),
                jitter: self.jitter.fixed(),
            },
            ChaosMode::Random => ChaosParams {
                dup_prob: self.dup_prob.sample(rng),
                slow_prob: self.slow_prob.sample(rng),
                base_delay: self.base_delay.sample(rng),
                jitter: self.jitter.sample(rng),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        let knobs = [
            ("dup_prob", self.dup_prob, true),
            ("slow_prob", self.slow_prob, true),
            ("base_delay", self.base_delay, false),
            ("jitter", self.jitter, false),
        ];
        for (name, value, is_probability) in knobs {
            let (lo, hi) = value.bounds();
            if !lo.is_finite() || !hi.is_finite() {
                return Err(PipelineError::Config(format!("chaos.{} must be finite", name)));
            }
            if lo > hi {
                return Err(PipelineError::Config(format!(
                    "chaos.{} range must be [low, high], got [{}, {}]",
                    name, lo, hi
                )));
            }
            if lo < 0.0 || (is_probability && hi > 1.0) {
                return Err(PipelineError::Config(format!(
                    "chaos.{} out of range: [{}, {}]",
                    name, lo, hi
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepPolicy {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub enabled: Vec<String>,
    pub bronze_append: BronzeAppendConfig,
    #[serde(alias = "polars_merge")]
    pub last_write_wins: LastWriteWinsConfig,
    pub eager_dedup: EagerDedupConfig,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                constants::BRONZE_APPEND.to_string(),
                constants::LAST_WRITE_WINS.to_string(),
            ],
            bronze_append: BronzeAppendConfig::default(),
            last_write_wins: LastWriteWinsConfig::default(),
            eager_dedup: EagerDedupConfig::default(),
        }
    }
}

impl StrategiesConfig {
    /// Map legacy strategy names onto their current registry keys
    fn normalize_names(&mut self) {
        for name in self.enabled.iter_mut() {
            if name == "polars_merge" {
                *name = constants::LAST_WRITE_WINS.to_string();
            }
        }
    }
}

/// Bronze layer: append-only with hash columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BronzeAppendConfig {
    pub partition_by: Vec<String>,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for BronzeAppendConfig {
    fn default() -> Self {
        Self {
            partition_by: vec!["partition_date".to_string()],
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LastWriteWinsConfig {
    pub dedup_key: String,
    pub sort_by: String,
    pub keep: KeepPolicy,
}

impl Default for LastWriteWinsConfig {
    fn default() -> Self {
        Self {
            dedup_key: "message_id".to_string(),
            sort_by: "created_at".to_string(),
            keep: KeepPolicy::Last,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EagerDedupConfig {
    pub write_mode: WriteMode,
    pub hash_algorithm: HashAlgorithm,
}

// ---------------------------------------------------------------------------
// Storage and orchestration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub raw_data_path: PathBuf,
    #[serde(alias = "delta_base_path")]
    pub table_base_path: PathBuf,
    pub retention_days: u32,
    pub compression: TableCompression,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_data_path: env_path("RAW_DATA_PATH", constants::DEFAULT_RAW_DATA_PATH),
            table_base_path: env_path("DELTA_TABLE_PATH", constants::DEFAULT_TABLE_BASE_PATH),
            retention_days: 30,
            compression: TableCompression::default(),
        }
    }
}

fn env_path(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(fallback))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub flow_name: String,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            flow_name: "config-driven-pipeline".to_string(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Retries for each strategy task
    pub max_retries: u32,
    /// Retries for the generate task
    pub generate_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            generate_retries: 2,
            retry_delay_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write JSON lines to the rolling log file
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "${LOG_LEVEL}".to_string(),
            structured: true,
        }
    }
}

impl LoggingConfig {
    /// The configured level, falling back to `$LOG_LEVEL` and then `info`
    /// when the placeholder was never resolved.
    pub fn resolved_level(&self) -> String {
        let level = interpolate_str(&self.level);
        if level.trim().is_empty() || level.contains("${") {
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
        } else {
            level
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
    pub cron: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 4200,
            cron: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Runtime overrides from the CLI or an HTTP trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOverrides {
    pub source: Option<SourceType>,
    pub mode: Option<GenerationMode>,
    /// A record count or a preset name
    pub scale: Option<Scale>,
    pub path: Option<String>,
}

impl Config {
    /// Parse a YAML document, interpolating `${VAR}` references first.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(content)?;
        let raw = match raw {
            Value::Null => Value::Mapping(Default::default()),
            other => other,
        };
        let mut config: Config = serde_yaml::from_value(interpolate_env_vars(raw))?;
        config.strategies.normalize_names();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let supported = constants::get_supported_strategies();
        for name in &self.strategies.enabled {
            if !supported.contains(&name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "Unknown strategy: {}. Valid: {}",
                    name,
                    supported.join(", ")
                )));
            }
        }
        if self.generation.scale.0 == 0 {
            return Err(PipelineError::Config("generation.scale must be positive".into()));
        }
        self.generation.chaos.validate()?;
        for (name, path) in [
            ("raw_data_path", &self.storage.raw_data_path),
            ("table_base_path", &self.storage.table_base_path),
        ] {
            if path.to_string_lossy().contains("${") {
                return Err(PipelineError::Config(format!(
                    "storage.{} has an unresolved environment variable: {}",
                    name,
                    path.display()
                )));
            }
        }
        self.source.options.validate()
    }

    pub fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(source) = overrides.source {
            debug!("Overriding source type: {}", source);
            self.source.source_type = source;
        }
        if let Some(mode) = overrides.mode {
            debug!("Overriding generation mode: {}", mode.as_str());
            self.generation.mode = mode;
        }
        if let Some(scale) = overrides.scale {
            debug!("Overriding scale: {}", scale.0);
            self.generation.scale = scale;
        }
        if let Some(path) = &overrides.path {
            debug!("Overriding file path: {}", path);
            self.source.path = Some(path.clone());
        }
    }
}

/// Replace every `${NAME}` in `s` with the variable's value. Unset variables
/// leave the placeholder as written.
pub fn interpolate_str(s: &str) -> String {
    ENV_VAR
        .replace_all(s, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Recursively interpolate environment variables in every string of a YAML tree.
pub fn interpolate_env_vars(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(&s)),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(interpolate_env_vars).collect())
        }
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, interpolate_env_vars(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Config path precedence: explicit argument, `$PIPELINE_CONFIG`, then the default.
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| std::env::var("PIPELINE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CONFIG_PATH))
}

/// Load and validate configuration from a YAML file.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = resolve_config_path(path);
    if !path.exists() {
        return Err(PipelineError::ConfigNotFound(path));
    }
    let content = fs::read_to_string(&path).map_err(|e| {
        PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;
    let config = Config::from_yaml_str(&content)?;
    config.validate()?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Combine the inline source options with the sections of `source.config_file`.
/// Top-level sections present in the file replace the inline ones.
pub fn merge_source_options(config: &Config) -> Result<SourceOptions> {
    let mut merged = serde_yaml::to_value(&config.source.options)?;

    if let Some(file) = &config.source.config_file {
        if file.exists() {
            let content = fs::read_to_string(file)?;
            let overlay = interpolate_env_vars(serde_yaml::from_str(&content)?);
            if let (Value::Mapping(base), Value::Mapping(sections)) = (&mut merged, overlay) {
                for (key, section) in sections {
                    base.insert(key, section);
                }
            }
        } else {
            warn!("Source config file {} not found; using inline options", file.display());
        }
    }

    let options: SourceOptions = serde_yaml::from_value(merged)?;
    options.validate()?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    #[test]
    fn test_fixed_chaos_returns_exact_values() {
        let chaos = ChaosConfig {
            mode: ChaosMode::Fixed,
            dup_prob: ChaosValue::Fixed(0.1),
            slow_prob: ChaosValue::Fixed(0.15),
            ..ChaosConfig::default()
        };
        let sampled = chaos.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(sampled.dup_prob, 0.1);
        assert_eq!(sampled.slow_prob, 0.15);
    }

    #[test]
    fn test_fixed_chaos_uses_lower_bound_of_ranges() {
        let chaos = ChaosConfig {
            mode: ChaosMode::Fixed,
            dup_prob: ChaosValue::Range([0.05, 0.15]),
            ..ChaosConfig::default()
        };
        let sampled = chaos.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(sampled.dup_prob, 0.05);
    }

    #[test]
    fn test_random_chaos_samples_within_ranges() {
        let chaos = ChaosConfig {
            mode: ChaosMode::Random,
            dup_prob: ChaosValue::Range([0.05, 0.15]),
            slow_prob: ChaosValue::Range([0.05, 0.15]),
            ..ChaosConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let sampled = chaos.sample(&mut rng);
            assert!((0.05..=0.15).contains(&sampled.dup_prob));
            assert!((0.05..=0.15).contains(&sampled.slow_prob));
        }
    }

    #[test]
    fn test_scale_presets() {
        let config = Config::from_yaml_str("generation:\n  scale: medium\n").unwrap();
        assert_eq!(config.generation.scale, Scale(10_000));

        let config = Config::from_yaml_str("generation:\n  scale: large\n").unwrap();
        assert_eq!(config.generation.scale, Scale(1_000_000));

        let config = Config::from_yaml_str("generation:\n  scale: 50000\n").unwrap();
        assert_eq!(config.generation.scale, Scale(50_000));
    }

    #[test]
    fn test_unknown_scale_preset_is_rejected() {
        assert!(Config::from_yaml_str("generation:\n  scale: huge\n").is_err());
    }

    #[test]
    fn test_valid_source_types() {
        for (raw, expected) in [
            ("pubsub", SourceType::Pubsub),
            ("synthetic", SourceType::Synthetic),
            ("polars_synthetic", SourceType::Synthetic),
            ("file", SourceType::File),
        ] {
            let config = Config::from_yaml_str(&format!("source:\n  type: {}\n", raw)).unwrap();
            assert_eq!(config.source.source_type, expected);
        }
    }

    #[test]
    fn test_invalid_source_type() {
        assert!(Config::from_yaml_str("source:\n  type: invalid\n").is_err());
        assert!("invalid".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_default_strategies() {
        let config = StrategiesConfig::default();
        assert!(config.enabled.contains(&"bronze_append".to_string()));
        assert!(config.enabled.contains(&"last_write_wins".to_string()));
        assert_eq!(config.bronze_append.partition_by, vec!["partition_date".to_string()]);
        assert_eq!(config.bronze_append.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.last_write_wins.dedup_key, "message_id");
        assert_eq!(config.last_write_wins.keep, KeepPolicy::Last);
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.pipeline.name, "configdriven-pipeline");
        assert_eq!(config.source.source_type, SourceType::Pubsub);
        assert_eq!(config.generation.mode, GenerationMode::Chaos);
        assert_eq!(config.generation.seed, Some(42));
        assert_eq!(config.orchestration.execution.max_retries, 3);
    }

    #[test]
    fn test_legacy_keys_are_accepted() {
        let yaml = r#"
strategies:
  enabled: [bronze_append, polars_merge]
  polars_merge:
    dedup_key: composite_hash
    keep: first
prefect:
  execution:
    max_retries: 1
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.strategies.enabled, vec!["bronze_append", "last_write_wins"]);
        assert_eq!(config.strategies.last_write_wins.dedup_key, "composite_hash");
        assert_eq!(config.strategies.last_write_wins.keep, KeepPolicy::First);
        assert_eq!(config.orchestration.execution.max_retries, 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_strategy_name() {
        let config = Config::from_yaml_str("strategies:\n  enabled: [invalid_strategy]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probability_out_of_range_is_rejected() {
        let config = Config::from_yaml_str("generation:\n  chaos:\n    dup_prob: 1.5\n").unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::from_yaml_str("generation:\n  chaos:\n    slow_prob: [0.3, 0.1]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interpolate_simple_string() {
        std::env::set_var("DEDUP_LAB_TEST_SIMPLE", "/path/to/data");
        let result = interpolate_env_vars(Value::String("${DEDUP_LAB_TEST_SIMPLE}".into()));
        assert_eq!(result, Value::String("/path/to/data".into()));
    }

    #[test]
    fn test_interpolate_nested() {
        std::env::set_var("DEDUP_LAB_TEST_LEVEL", "DEBUG");
        std::env::set_var("DEDUP_LAB_TEST_ROOT", "/data");
        let raw: Value = serde_yaml::from_str(
            "config:\n  logging:\n    level: ${DEDUP_LAB_TEST_LEVEL}\n  paths: [\"${DEDUP_LAB_TEST_ROOT}/raw\", static]\n",
        )
        .unwrap();
        let result = interpolate_env_vars(raw);
        assert_eq!(result["config"]["logging"]["level"], Value::String("DEBUG".into()));
        assert_eq!(result["config"]["paths"][0], Value::String("/data/raw".into()));
        assert_eq!(result["config"]["paths"][1], Value::String("static".into()));
    }

    #[test]
    fn test_missing_env_var_keeps_placeholder() {
        let result = interpolate_str("${DEDUP_LAB_TEST_NONEXISTENT_VAR}");
        assert_eq!(result, "${DEDUP_LAB_TEST_NONEXISTENT_VAR}");
    }

    #[test]
    fn test_unresolved_storage_path_is_rejected() {
        let config = Config::from_yaml_str(
            "storage:\n  raw_data_path: ${DEDUP_LAB_TEST_UNSET_RAW}\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_nonexistent_config() {
        let err = load_config(Some(Path::new("/nonexistent/config.yaml"))).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigNotFound(_)));
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        config.apply_overrides(&RunOverrides {
            source: Some(SourceType::File),
            mode: Some(GenerationMode::Speed),
            scale: Some(Scale(123)),
            path: Some("input/*.jsonl".to_string()),
        });
        assert_eq!(config.source.source_type, SourceType::File);
        assert_eq!(config.generation.mode, GenerationMode::Speed);
        assert_eq!(config.generation.scale, Scale(123));
        assert_eq!(config.source.path.as_deref(), Some("input/*.jsonl"));
    }

    #[test]
    fn test_overrides_accept_scale_presets_from_json() {
        let overrides: RunOverrides =
            serde_json::from_str(r#"{"scale":"small","mode":"speed"}"#).unwrap();
        assert_eq!(overrides.scale, Some(Scale(100)));
        assert_eq!(overrides.mode, Some(GenerationMode::Speed));

        let overrides: RunOverrides = serde_json::from_str(r#"{"scale":250}"#).unwrap();
        assert_eq!(overrides.scale, Some(Scale(250)));

        assert!(serde_json::from_str::<RunOverrides>(r#"{"scale":"huge"}"#).is_err());
    }

    #[test]
    fn test_single_value_range_is_valid() {
        let yaml = "source:\n  pubsub:\n    message:\n      value_range: [500, 500]\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();

        let yaml = "source:\n  pubsub:\n    message:\n      value_range: [500, 100]\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_config_file_sections_replace_inline_options() {
        let dir = tempfile::tempdir().unwrap();
        let source_file = dir.path().join("pubsub.yaml");
        let mut f = fs::File::create(&source_file).unwrap();
        writeln!(f, "pubsub:\n  partitions: 7\n  message:\n    id_length: 12").unwrap();

        let yaml = format!(
            "source:\n  type: pubsub\n  config_file: {}\n  file:\n    schema:\n      required_fields: [message_id]\n",
            source_file.display()
        );
        let config = Config::from_yaml_str(&yaml).unwrap();
        let options = merge_source_options(&config).unwrap();
        assert_eq!(options.pubsub.partitions, 7);
        assert_eq!(options.pubsub.message.id_length, 12);
        assert_eq!(options.pubsub.buffer_size, 100);
        assert_eq!(options.file.schema.required_fields, vec!["message_id".to_string()]);
    }
}
