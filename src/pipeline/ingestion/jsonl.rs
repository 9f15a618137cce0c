use crate::error::{PipelineError, Result};
use crate::types::EventRecord;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read every record of a JSON-lines batch. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<EventRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            PipelineError::Config(format!(
                "{}:{}: invalid record: {}",
                path.display(),
                line_no + 1,
                e
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Number of non-empty lines
pub fn count_records(path: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// First non-empty line parsed as a JSON object, if any
pub fn first_object(path: &Path) -> Result<Option<serde_json::Map<String, Value>>> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        return match serde_json::from_str::<Value>(&line)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        };
    }
    Ok(None)
}

pub fn write_records(path: &Path, records: &[EventRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_count_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/batch.jsonl");
        let records = vec![
            EventRecord::new("a", 1, 0, 1.0),
            EventRecord::new("b", 2, 1, 2.0),
        ];
        write_records(&path, &records).unwrap();

        assert_eq!(count_records(&path).unwrap(), 2);
        assert_eq!(read_records(&path).unwrap(), records);
        let first = first_object(&path).unwrap().unwrap();
        assert_eq!(first["message_id"], "a");
    }

    #[test]
    fn test_invalid_line_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"message_id\":\"a\"}\n").unwrap();
        let err = read_records(&path).unwrap_err().to_string();
        assert!(err.contains(":1:"), "{}", err);
    }
}
