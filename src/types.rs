use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One simulated pub/sub message as it lands in a raw JSONL batch.
///
/// Identity and payload fields are typed; anything else in the input line
/// (for example the subscriber's `event` tag) is kept in `extra` so it
/// round-trips and participates in the payload hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(deserialize_with = "string_like")]
    pub message_id: String,
    pub sequence_id: i64,
    pub partition_id: i64,
    /// Epoch seconds
    pub created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(
        default,
        deserialize_with = "optional_string_like",
        skip_serializing_if = "Option::is_none"
    )]
    pub zipcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_index: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Columns every record exposes by name
pub const RECORD_COLUMNS: &[&str] = &[
    "message_id",
    "sequence_id",
    "partition_id",
    "created_at",
    "value",
    "zipcode",
    "arrival_ts",
    "arrival_index",
];

/// Columns added by the strategies
pub const DERIVED_COLUMNS: &[&str] = &["composite_hash", "payload_hash", "partition_date"];

impl EventRecord {
    pub fn new(message_id: &str, sequence_id: i64, partition_id: i64, created_at: f64) -> Self {
        Self {
            message_id: message_id.to_string(),
            sequence_id,
            partition_id,
            created_at,
            value: None,
            zipcode: None,
            arrival_ts: None,
            arrival_index: None,
            extra: BTreeMap::new(),
        }
    }

    /// Look a field up by column name. `None` means the column is absent or null.
    pub fn column(&self, name: &str) -> Option<Value> {
        match name {
            "message_id" => Some(Value::from(self.message_id.clone())),
            "sequence_id" => Some(Value::from(self.sequence_id)),
            "partition_id" => Some(Value::from(self.partition_id)),
            "created_at" => Some(Value::from(self.created_at)),
            "value" => self.value.map(Value::from),
            "zipcode" => self.zipcode.clone().map(Value::from),
            "arrival_ts" => self.arrival_ts.map(Value::from),
            "arrival_index" => self.arrival_index.map(Value::from),
            other => self.extra.get(other).filter(|v| !v.is_null()).cloned(),
        }
    }

    /// UTC calendar date of `created_at`
    pub fn created_date(&self) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp_millis((self.created_at * 1000.0).floor() as i64)
            .map(|dt| dt.date_naive())
    }
}

/// A record after a strategy has attached its hash and partition columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    #[serde(flatten)]
    pub record: EventRecord,
    pub composite_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_date: Option<NaiveDate>,
}

impl ProcessedRecord {
    pub fn new(record: EventRecord, composite_hash: String) -> Self {
        Self {
            record,
            composite_hash,
            payload_hash: None,
            partition_date: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<Value> {
        match name {
            "composite_hash" => Some(Value::from(self.composite_hash.clone())),
            "payload_hash" => self.payload_hash.clone().map(Value::from),
            "partition_date" => self.partition_date.map(|d| Value::from(d.to_string())),
            other => self.record.column(other),
        }
    }
}

/// What a strategy hands back: the processed batch, informational metrics
/// and the table it wrote.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub batch: Vec<ProcessedRecord>,
    pub metrics: Value,
    pub output_path: PathBuf,
}

/// Total order over optional JSON scalars used for sort keys: nulls first,
/// then booleans, numbers, strings; mixed kinds compare by kind.
pub fn compare_values(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    fn rank(v: &Option<Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 4 && rank(b) == 4 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable grouping key for a column value
pub fn key_string(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn string_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn optional_string_like<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}
