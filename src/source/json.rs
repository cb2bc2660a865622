//! JSON record files: either one array of records or JSON Lines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::error::{Result, SiftError};
use crate::model::record::{EmailRecord, Folder};

use super::{select, RecordSource};

/// Records loaded from a `.json` (array) or `.jsonl` (one object per line) file.
///
/// A record that fails to deserialize is skipped with a warning; the rest of
/// the file still loads.
#[derive(Debug)]
pub struct JsonFileSource {
    path: PathBuf,
    records: Vec<EmailRecord>,
    skipped: usize,
}

impl JsonFileSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SiftError::FileNotFound(path.to_path_buf())
            } else {
                SiftError::io(path, e)
            }
        })?;

        let (records, skipped) = parse_records(&text).map_err(|reason| SiftError::InvalidRecords {
            path: path.to_path_buf(),
            reason,
        })?;

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Skipped malformed records");
        }
        info!(path = %path.display(), count = records.len(), "Loaded records");

        Ok(Self {
            path: path.to_path_buf(),
            records,
            skipped,
        })
    }

    pub fn records(&self) -> &[EmailRecord] {
        &self.records
    }

    /// Number of entries that could not be read as records.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl RecordSource for JsonFileSource {
    fn fetch_records(
        &self,
        since_hint: Option<DateTime<FixedOffset>>,
        limit: usize,
        folder: Option<&Folder>,
    ) -> Result<Vec<EmailRecord>> {
        Ok(select(&self.records, since_hint, limit, folder))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse an array or JSON Lines document. Returns the records and how many
/// entries were skipped. Only a document that is neither form is an error.
fn parse_records(text: &str) -> std::result::Result<(Vec<EmailRecord>, usize), String> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let values: Vec<serde_json::Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| e.to_string())?
    } else {
        let mut values = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(v) => values.push(v),
                Err(e) => {
                    debug!(line = n + 1, error = %e, "Skipping unparsable JSON line");
                    values.push(serde_json::Value::Null);
                }
            }
        }
        values
    };

    let mut skipped = 0;
    let mut records = Vec::with_capacity(values.len());
    for (n, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<EmailRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(entry = n, error = %e, "Skipping malformed record");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array() {
        let text = r#"[
            {"id": 1, "from": "Alice <alice@x.com>", "subject": "Hi",
             "date": "2024-03-14T09:00:00+01:00", "size": 1200, "unread": true},
            {"id": 2, "from": {"display_name": "", "address": "bob@y.com"},
             "to": ["me@home.net"], "date": "2024-03-14T10:00:00Z", "folder": "Sent"}
        ]"#;
        let (records, skipped) = parse_records(text).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].from.display_name, "Alice");
        assert!(records[0].unread);
        assert_eq!(records[1].to[0].address, "me@home.net");
        assert_eq!(records[1].folder, Folder::Sent);
    }

    #[test]
    fn test_parse_jsonl_skips_bad_lines() {
        let text = "{\"id\": 1, \"date\": \"2024-03-14T09:00:00Z\"}\n\
                    not json\n\
                    {\"id\": 2}\n\
                    \n\
                    {\"id\": 3, \"date\": \"2024-03-15T09:00:00Z\"}\n";
        let (records, skipped) = parse_records(text).unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_parse_broken_array_is_error() {
        assert!(parse_records("[{\"id\": 1,").is_err());
        assert_eq!(parse_records("   ").unwrap().0.len(), 0);
    }
}
