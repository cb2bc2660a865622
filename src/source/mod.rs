//! Record sources: where the engine's email records come from.
//!
//! The engine only ever calls [`RecordSource::fetch_records`]. The `since`
//! hint is advisory: sources apply it when cheap, and the filter re-checks
//! the complete time range locally either way.

pub mod eml;
pub mod json;

use std::path::Path;

use chrono::{DateTime, FixedOffset};

use crate::error::{Result, SiftError};
use crate::model::record::{EmailRecord, Folder};

pub use eml::EmlDirSource;
pub use json::JsonFileSource;

/// Supplier of already-fetched email records.
pub trait RecordSource {
    /// Fetch up to `limit` records (`0` = all), most recent first, at or
    /// after `since_hint` and in `folder` when given.
    fn fetch_records(
        &self,
        since_hint: Option<DateTime<FixedOffset>>,
        limit: usize,
        folder: Option<&Folder>,
    ) -> Result<Vec<EmailRecord>>;

    /// Short label for logs and report headers.
    fn name(&self) -> String;
}

/// Records held in memory. Used by tests, benches and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<EmailRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<EmailRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn fetch_records(
        &self,
        since_hint: Option<DateTime<FixedOffset>>,
        limit: usize,
        folder: Option<&Folder>,
    ) -> Result<Vec<EmailRecord>> {
        Ok(select(&self.records, since_hint, limit, folder))
    }

    fn name(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }
}

/// Apply the fetch hints to an in-memory set: folder and `since` filter,
/// most recent first, then `limit`.
pub fn select(
    records: &[EmailRecord],
    since_hint: Option<DateTime<FixedOffset>>,
    limit: usize,
    folder: Option<&Folder>,
) -> Vec<EmailRecord> {
    let mut selected: Vec<EmailRecord> = records
        .iter()
        .filter(|e| since_hint.is_none_or(|since| e.date >= since))
        .filter(|e| folder.is_none_or(|f| e.folder == *f))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    if limit > 0 {
        selected.truncate(limit);
    }
    selected
}

/// Open `path` as a record source: a directory of `.eml` files, or a JSON /
/// JSON Lines file.
///
/// `progress` receives `(loaded, total)` while a directory is parsed.
pub fn open(path: &Path, progress: Option<&dyn Fn(u64, u64)>) -> Result<Box<dyn RecordSource>> {
    if !path.exists() {
        return Err(SiftError::FileNotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        Ok(Box::new(EmlDirSource::load(path, progress)?))
    } else {
        Ok(Box::new(JsonFileSource::load(path)?))
    }
}
