/// Registry keys shared by the config loader, the registries and the CLI.

// Source names (config `source.type`, CLI `--source`)
pub const PUBSUB_SOURCE: &str = "pubsub";
pub const SYNTHETIC_SOURCE: &str = "synthetic";
pub const FILE_SOURCE: &str = "file";

// Strategy names (config `strategies.enabled`)
pub const BRONZE_APPEND: &str = "bronze_append";
pub const LAST_WRITE_WINS: &str = "last_write_wins";
pub const EAGER_DEDUP: &str = "eager_dedup";

// Table directory names under the table base path
pub const BRONZE_APPEND_TABLE: &str = "pubsub_bronze_append";
pub const LAST_WRITE_WINS_TABLE: &str = "pubsub_last_write_wins";
pub const EAGER_DEDUP_TABLE: &str = "pubsub_eager_dedup";

// Raw file prefixes written by the sources
pub const PUBSUB_FILE_PREFIX: &str = "pubsub_sim";
pub const SYNTHETIC_FILE_PREFIX: &str = "synthetic";
pub const COMBINED_INPUT_FILE: &str = "combined_input.jsonl";

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.yaml";
pub const DEFAULT_RAW_DATA_PATH: &str = "data/raw";
pub const DEFAULT_TABLE_BASE_PATH: &str = "data/tables";

/// Resolve a named scale preset to a record count.
pub fn scale_preset(name: &str) -> Option<u64> {
    match name {
        "small" => Some(100),
        "medium" => Some(10_000),
        "large" => Some(1_000_000),
        "xlarge" => Some(10_000_000),
        _ => None,
    }
}

/// Fields a JSONL input must carry unless the source options say otherwise
pub fn default_required_fields() -> Vec<String> {
    ["message_id", "sequence_id", "partition_id", "created_at", "value"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// All built-in strategy names, in default execution order
pub fn get_supported_strategies() -> Vec<&'static str> {
    vec![BRONZE_APPEND, LAST_WRITE_WINS, EAGER_DEDUP]
}
