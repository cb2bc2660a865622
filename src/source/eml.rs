//! Directory of `.eml` files (bare RFC 5322 messages).
//!
//! Files directly under the root are Inbox; files in an immediate
//! subdirectory take that directory's name as their folder (`sent/`,
//! `drafts/`, `archive/`). Records are numbered in path order, from 1.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, info};

use crate::error::{Result, SiftError};
use crate::model::address::EmailAddress;
use crate::model::record::{EmailRecord, Folder};

use super::{select, RecordSource};

/// Records parsed from a directory of `.eml` files.
#[derive(Debug)]
pub struct EmlDirSource {
    root: PathBuf,
    records: Vec<EmailRecord>,
}

impl EmlDirSource {
    /// Parse every `.eml` file under `root`.
    ///
    /// Unreadable or unparsable files are skipped. `progress` receives
    /// `(parsed, total)` after each file.
    pub fn load(root: impl AsRef<Path>, progress: Option<&dyn Fn(u64, u64)>) -> Result<Self> {
        let root = root.as_ref();
        let files = collect_files(root)?;
        let total = files.len() as u64;

        let mut records = Vec::with_capacity(files.len());
        for (seq, (path, folder)) in files.into_iter().enumerate() {
            match parse_eml_file(&path, seq as u64 + 1, folder) {
                Ok(record) => records.push(record),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable message"),
            }
            if let Some(cb) = progress {
                cb(seq as u64 + 1, total);
            }
        }

        info!(root = %root.display(), count = records.len(), "Loaded .eml directory");
        Ok(Self {
            root: root.to_path_buf(),
            records,
        })
    }

    pub fn records(&self) -> &[EmailRecord] {
        &self.records
    }
}

impl RecordSource for EmlDirSource {
    fn fetch_records(
        &self,
        since_hint: Option<DateTime<FixedOffset>>,
        limit: usize,
        folder: Option<&Folder>,
    ) -> Result<Vec<EmailRecord>> {
        Ok(select(&self.records, since_hint, limit, folder))
    }

    fn name(&self) -> String {
        self.root.display().to_string()
    }
}

fn is_eml(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
}

/// `.eml` files under `root` and one level of subdirectories, sorted by path.
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, Folder)>> {
    let read_dir = |dir: &Path| -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| SiftError::io(dir, e))? {
            paths.push(entry.map_err(|e| SiftError::io(dir, e))?.path());
        }
        paths.sort();
        Ok(paths)
    };

    let mut files = Vec::new();
    for path in read_dir(root)? {
        if path.is_dir() {
            let folder = path
                .file_name()
                .map(|n| Folder::from(n.to_string_lossy().into_owned()))
                .unwrap_or_default();
            for inner in read_dir(&path)? {
                if is_eml(&inner) {
                    files.push((inner, folder.clone()));
                }
            }
        } else if is_eml(&path) {
            files.push((path, Folder::Inbox));
        }
    }
    Ok(files)
}

/// Parse one `.eml` file into a record.
pub fn parse_eml_file(path: &Path, id: u64, folder: Folder) -> Result<EmailRecord> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SiftError::FileNotFound(path.to_path_buf())
        } else {
            SiftError::io(path, e)
        }
    })?;

    let fallback_date = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).fixed_offset())
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH.fixed_offset());

    parse_message(&data, id, folder, fallback_date).ok_or_else(|| SiftError::InvalidRecords {
        path: path.to_path_buf(),
        reason: "not an RFC 5322 message".to_string(),
    })
}

/// Build a record from raw message bytes. `fallback_date` is used when the
/// message has no parsable `Date:` header.
pub fn parse_message(
    data: &[u8],
    id: u64,
    folder: Folder,
    fallback_date: DateTime<FixedOffset>,
) -> Option<EmailRecord> {
    let msg = MessageParser::default().parse(data)?;
    let headers = raw_headers(data);

    let date = msg
        .date()
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
        .unwrap_or(fallback_date);

    let from = addresses(msg.from()).into_iter().next().unwrap_or_default();

    let attachments = msg
        .attachments()
        .enumerate()
        .map(|(idx, part)| {
            part.attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{idx}"))
        })
        .collect();

    // Status: RO / R mark a read message in mbox-derived files.
    let unread = header_value(&headers, "Status").is_none_or(|s| !s.contains('R'));

    Some(EmailRecord {
        id,
        from,
        to: addresses(msg.to()),
        cc: addresses(msg.cc()),
        bcc: addresses(msg.bcc()),
        subject: msg.subject().unwrap_or_default().to_string(),
        date,
        body: msg
            .body_text(0)
            .map(|s| s.into_owned())
            .unwrap_or_default(),
        html: msg.body_html(0).map(|s| s.into_owned()),
        attachments,
        size: data.len() as u64,
        unread,
        folder,
        list_unsubscribe: header_value(&headers, "List-Unsubscribe"),
    })
}

fn addresses(value: Option<&mail_parser::Address<'_>>) -> Vec<EmailAddress> {
    let Some(value) = value else {
        return Vec::new();
    };
    let addrs: Vec<&mail_parser::Addr<'_>> = match value {
        mail_parser::Address::List(list) => list.iter().collect(),
        mail_parser::Address::Group(groups) => {
            groups.iter().flat_map(|g| g.addresses.iter()).collect()
        }
    };
    addrs
        .into_iter()
        .filter_map(|a| {
            let address = a.address.as_deref()?.trim();
            (!address.is_empty()).then(|| EmailAddress {
                display_name: a.name.as_deref().unwrap_or_default().trim().to_string(),
                address: address.to_string(),
            })
        })
        .collect()
}

/// The header block (everything before the first blank line).
fn raw_headers(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    let end = text
        .find("\r\n\r\n")
        .into_iter()
        .chain(text.find("\n\n"))
        .min()
        .unwrap_or(text.len());
    text[..end].to_string()
}

/// Unfolded value of the first header called `name` (case-insensitive).
fn header_value(headers: &str, name: &str) -> Option<String> {
    let mut value: Option<String> = None;
    for line in headers.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(v) = value.as_mut() {
            if line.starts_with([' ', '\t']) {
                v.push(' ');
                v.push_str(line.trim());
                continue;
            }
            break;
        }
        if let Some((key, rest)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                value = Some(rest.trim().to_string());
            }
        }
    }
    value.filter(|v| !v.is_empty())
}
