use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML deserialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Parquet write failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {}\nTry setting PIPELINE_CONFIG or run from the project root", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Unknown source type: {name}. Available: {available}")]
    UnknownSource { name: String, available: String },

    #[error("Unknown strategy: {name}. Available: {available}")]
    UnknownStrategy { name: String, available: String },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("File {} missing required fields: {}", path.display(), missing.join(", "))]
    SchemaMismatch { path: PathBuf, missing: Vec<String> },

    #[error("Output file is empty: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("No files found matching pattern: {0}")]
    NoInputFiles(String),

    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
