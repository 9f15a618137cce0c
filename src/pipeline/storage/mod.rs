//! Parquet table directories.
//!
//! A table is a directory of Parquet data files, optionally split into hive
//! style `column=value/` partitions, plus an append-only `_commit_log.ndjson`
//! recording every write.

use crate::error::{PipelineError, Result};
use crate::types::{key_string, ProcessedRecord, DERIVED_COLUMNS, RECORD_COLUMNS};
use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, Utc};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const COMMIT_LOG_FILE: &str = "_commit_log.ndjson";
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCompression {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    None,
}

impl TableCompression {
    fn codec(&self) -> Compression {
        match self {
            TableCompression::Snappy => Compression::SNAPPY,
            TableCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            TableCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            TableCompression::None => Compression::UNCOMPRESSED,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub mode: WriteMode,
    pub partition_by: Vec<String>,
    pub compression: TableCompression,
}

/// One entry of the commit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCommit {
    pub version: u64,
    pub mode: WriteMode,
    /// Data files added by this commit, relative to the table root
    pub files: Vec<String>,
    pub rows: usize,
    pub committed_at: DateTime<Utc>,
}

fn table_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("message_id", DataType::Utf8, false),
        Field::new("sequence_id", DataType::Int64, false),
        Field::new("partition_id", DataType::Int64, false),
        Field::new("created_at", DataType::Float64, false),
        Field::new("value", DataType::Int64, true),
        Field::new("zipcode", DataType::Utf8, true),
        Field::new("arrival_ts", DataType::Float64, true),
        Field::new("arrival_index", DataType::UInt64, true),
        Field::new("composite_hash", DataType::Utf8, false),
        Field::new("payload_hash", DataType::Utf8, true),
        Field::new("partition_date", DataType::Date32, true),
        Field::new("extra", DataType::Utf8, true),
    ]))
}

fn to_record_batch(rows: &[&ProcessedRecord]) -> Result<RecordBatch> {
    let extra = rows
        .iter()
        .map(|r| {
            if r.record.extra.is_empty() {
                Ok(None)
            } else {
                serde_json::to_string(&r.record.extra).map(Some)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.record.message_id.as_str()),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.record.sequence_id))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.record.partition_id))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.record.created_at))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.record.value))),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.record.zipcode.as_deref()),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.record.arrival_ts))),
        Arc::new(UInt64Array::from_iter(rows.iter().map(|r| r.record.arrival_index))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.composite_hash.as_str()),
        )),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.payload_hash.as_deref()),
        )),
        Arc::new(Date32Array::from_iter(rows.iter().map(|r| {
            r.partition_date
                .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        }))),
        Arc::new(StringArray::from_iter(extra)),
    ];

    Ok(RecordBatch::try_new(table_schema(), columns)?)
}

/// Directory segment for one partition value
fn partition_segment(column: &str, record: &ProcessedRecord) -> String {
    let value = key_string(&record.column(column));
    if value.is_empty() {
        format!("{}={}", column, HIVE_DEFAULT_PARTITION)
    } else {
        format!("{}={}", column, value.replace('/', "%2F"))
    }
}

/// Remove everything in the table directory except the commit log.
fn clear_table_data(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_name() == COMMIT_LOG_FILE {
            continue;
        }
        let p = entry.path();
        if p.is_dir() {
            fs::remove_dir_all(&p)?;
        } else {
            fs::remove_file(&p)?;
        }
    }
    Ok(())
}

fn append_commit(path: &Path, commit: &TableCommit) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.join(COMMIT_LOG_FILE))?;
    writeln!(file, "{}", serde_json::to_string(commit)?)?;
    Ok(())
}

/// Write `rows` into the table at `path` and record the commit.
pub fn write_table(
    path: &Path,
    rows: &[ProcessedRecord],
    options: &WriteOptions,
) -> Result<TableCommit> {
    for column in &options.partition_by {
        let name = column.as_str();
        if !RECORD_COLUMNS.contains(&name) && !DERIVED_COLUMNS.contains(&name) {
            return Err(PipelineError::UnknownColumn(column.clone()));
        }
    }

    fs::create_dir_all(path)?;
    if options.mode == WriteMode::Overwrite {
        clear_table_data(path)?;
    }

    // Group by partition directory, keeping row order within a group
    let mut groups: BTreeMap<PathBuf, Vec<&ProcessedRecord>> = BTreeMap::new();
    for row in rows {
        let rel: PathBuf = options
            .partition_by
            .iter()
            .map(|c| partition_segment(c, row))
            .collect();
        groups.entry(rel).or_default().push(row);
    }

    let props = WriterProperties::builder()
        .set_compression(options.compression.codec())
        .build();
    let ts = Utc::now().format("%Y%m%d_%H%M%S");

    let mut files = Vec::with_capacity(groups.len());
    for (rel_dir, group) in groups {
        let part_dir = path.join(&rel_dir);
        fs::create_dir_all(&part_dir)?;
        let file_name = format!("part-{}-{}.parquet", ts, uuid::Uuid::new_v4());
        let file_path = part_dir.join(&file_name);

        let batch = to_record_batch(&group)?;
        let file = File::create(&file_path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props.clone()))?;
        writer.write(&batch)?;
        writer.close()?;

        debug!("Wrote {} rows to {}", group.len(), file_path.display());
        files.push(rel_dir.join(file_name).to_string_lossy().into_owned());
    }

    let commit = TableCommit {
        version: read_commit_log(path)?.len() as u64,
        mode: options.mode,
        files,
        rows: rows.len(),
        committed_at: Utc::now(),
    };
    append_commit(path, &commit)?;

    info!(
        table = %path.display(),
        version = commit.version,
        mode = commit.mode.as_str(),
        rows = commit.rows,
        files = commit.files.len(),
        "table_commit"
    );
    Ok(commit)
}

/// All commits of a table, oldest first. A table that was never written has none.
pub fn read_commit_log(path: &Path) -> Result<Vec<TableCommit>> {
    let log = path.join(COMMIT_LOG_FILE);
    if !log.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(log)?);
    let mut commits = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        commits.push(serde_json::from_str(&line)?);
    }
    Ok(commits)
}

/// Every Parquet data file below the table root
pub fn data_files(path: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*.parquet",
        glob::Pattern::escape(&path.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(|e| e.ok()).collect();
    files.sort();
    Ok(files)
}

/// Current row count, read from the Parquet footers
pub fn table_row_count(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for file in data_files(path)? {
        let reader = SerializedFileReader::new(File::open(&file)?)?;
        total += reader.metadata().file_metadata().num_rows().max(0) as u64;
    }
    Ok(total)
}

pub fn table_size_bytes(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for file in data_files(path)? {
        total += fs::metadata(&file)?.len();
    }
    Ok(total)
}
