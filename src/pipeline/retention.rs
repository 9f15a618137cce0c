use crate::constants;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Only files the sources generate are eligible; user inputs under the raw
/// directory are never touched.
fn is_generated_batch(name: &str) -> bool {
    name == constants::COMBINED_INPUT_FILE
        || (name.ends_with(".jsonl")
            && (name.starts_with(&format!("{}_", constants::PUBSUB_FILE_PREFIX))
                || name.starts_with(&format!("{}_", constants::SYNTHETIC_FILE_PREFIX))))
}

/// Delete generated raw batches last modified more than `retention_days` ago.
/// `0` keeps everything. Returns the removed paths.
pub fn prune_raw_files(raw_data_path: &Path, retention_days: u32) -> Result<Vec<PathBuf>> {
    if retention_days == 0 || !raw_data_path.is_dir() {
        return Ok(Vec::new());
    }
    let max_age = Duration::from_secs(retention_days as u64 * SECONDS_PER_DAY);
    let now = SystemTime::now();

    let mut removed = Vec::new();
    for entry in fs::read_dir(raw_data_path)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || !is_generated_batch(&name) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            debug!(
                path = %path.display(),
                age_days = age.as_secs() / SECONDS_PER_DAY,
                "pruning raw file"
            );
            fs::remove_file(&path)?;
            removed.push(path);
        }
    }

    if !removed.is_empty() {
        info!(removed = removed.len(), retention_days, "raw_retention_applied");
    }
    Ok(removed)
}
