//! Reads existing JSONL batches matched by a glob pattern.

use super::{jsonl, DataSource, SourceContext};
use crate::constants;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FileSource {
    pattern: String,
    required_fields: Vec<String>,
    raw_data_path: PathBuf,
}

impl FileSource {
    pub fn new(ctx: SourceContext) -> Result<Self> {
        let pattern = ctx
            .source
            .path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config("File source requires 'path' in source config".to_string())
            })?;
        Ok(Self {
            pattern,
            required_fields: ctx.options.file.schema.required_fields,
            raw_data_path: ctx.storage.raw_data_path,
        })
    }

    fn validate_schema(&self, path: &Path) -> Result<()> {
        let first = jsonl::first_object(path)?.unwrap_or_default();
        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|f| !first.contains_key(f.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                path: path.to_path_buf(),
                missing,
            });
        }
        debug!(path = %path.display(), "schema_validated");
        Ok(())
    }

    /// Concatenate `files` into `output`. Lines go to a sibling temp file that is
    /// renamed over `output` once complete, so readers never see a partial batch.
    fn combine_files(&self, files: &[PathBuf], output: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.raw_data_path)?;
        let staging = output.with_extension("jsonl.tmp");
        let mut writer = BufWriter::new(File::create(&staging)?);
        let mut total = 0u64;
        for file in files {
            for line in BufReader::new(File::open(file)?).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                total += 1;
            }
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&staging, output)?;

        info!(
            input_count = files.len(),
            output_path = %output.display(),
            total_records = total,
            "files_combined"
        );
        Ok(output.to_path_buf())
    }

    fn ingest(&self) -> Result<PathBuf> {
        info!(pattern = %self.pattern, "ingesting_file");

        let mut files: Vec<PathBuf> = glob::glob(&self.pattern)?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        // A previous combined batch is output, not input
        let output = self.raw_data_path.join(constants::COMBINED_INPUT_FILE);
        if files.len() > 1 {
            files.retain(|p| !is_same_file(p, &output));
        }
        if files.is_empty() {
            return Err(PipelineError::NoInputFiles(self.pattern.clone()));
        }
        info!(count = files.len(), "files_found");

        for file in &files {
            self.validate_schema(file)?;
        }

        if files.len() == 1 {
            return Ok(files.remove(0));
        }
        self.combine_files(&files, &output)
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[async_trait]
impl DataSource for FileSource {
    fn name(&self) -> &str {
        constants::FILE_SOURCE
    }

    async fn generate(&self) -> Result<PathBuf> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.ingest())
            .await
            .map_err(|e| PipelineError::Task {
                task: "file_ingest".to_string(),
                message: e.to_string(),
            })?
    }
}
