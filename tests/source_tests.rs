//! Integration tests for record sources: JSON, JSON Lines and `.eml` directories.

use std::cell::Cell;
use std::path::Path;

use assert_fs::prelude::*;
use chrono::DateTime;

use mailsift::error::SiftError;
use mailsift::model::record::Folder;
use mailsift::source::eml::EmlDirSource;
use mailsift::source::json::JsonFileSource;
use mailsift::source::{self, RecordSource};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

// ─── JSON ───────────────────────────────────────────────────────────

#[test]
fn test_json_array_fixture() {
    let source = JsonFileSource::load(fixture("records.json")).unwrap();
    assert_eq!(source.records().len(), 7);
    assert_eq!(source.skipped(), 0);

    let bob = &source.records()[1];
    assert_eq!(bob.from.display_name, "Bob Stone");
    assert_eq!(bob.from.address, "bob@shop.com");
    assert_eq!(bob.attachments, vec!["invoice-4411.pdf"]);
    assert!(bob.unread);

    assert_eq!(source.records()[6].folder, Folder::Sent);
    assert_eq!(source.records()[5].cc[0].address, "bob@shop.com");
}

#[test]
fn test_jsonl_skips_bad_lines() {
    let source = JsonFileSource::load(fixture("records.jsonl")).unwrap();
    let ids: Vec<u64> = source.records().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(source.skipped(), 2);
}

#[test]
fn test_json_fetch_hints() {
    let source = JsonFileSource::load(fixture("records.json")).unwrap();
    let since = DateTime::parse_from_rfc3339("2024-03-14T00:00:00+00:00").unwrap();

    let recent = source.fetch_records(Some(since), 0, None).unwrap();
    let ids: Vec<u64> = recent.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![7, 6, 5, 4, 3]);

    let limited = source.fetch_records(Some(since), 2, None).unwrap();
    assert_eq!(limited.len(), 2);

    let sent = source.fetch_records(None, 0, Some(&Folder::Sent)).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, 7);
}

#[test]
fn test_broken_json_array_is_an_error() {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child("broken.json");
    file.write_str(r#"[{"id": 1, "date": "2024-03-14T00:00:00Z"}"#)
        .unwrap();

    let err = JsonFileSource::load(file.path()).unwrap_err();
    assert_eq!(err.kind(), "InvalidRecords");
    assert!(err.to_string().contains("broken.json"));
}

#[test]
fn test_empty_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "").unwrap();

    let source = JsonFileSource::load(&path).unwrap();
    assert!(source.records().is_empty());
}

// ─── .eml directories ───────────────────────────────────────────────

#[test]
fn test_eml_directory_fixture() {
    let source = EmlDirSource::load(fixture("maildir"), None).unwrap();
    let records = source.records();
    assert_eq!(records.len(), 3);

    // Path order: Sent/ sorts before the lower-case file names.
    let reply = &records[0];
    assert_eq!(reply.folder, Folder::Sent);
    assert_eq!(reply.subject, "Re: Lunch on Friday?");

    let lunch = &records[1];
    assert_eq!(lunch.id, 2);
    assert_eq!(lunch.folder, Folder::Inbox);
    assert_eq!(lunch.from.display_name, "Alice Moreau");
    assert_eq!(lunch.from.address, "alice@example.com");
    assert_eq!(lunch.to[0].address, "me@home.net");
    assert_eq!(
        lunch.date,
        DateTime::parse_from_rfc3339("2024-03-14T12:30:00+01:00").unwrap()
    );
    assert!(lunch.body.contains("lunch on Friday"));
    assert!(lunch.unread);

    let sale = &records[2];
    assert!(!sale.unread, "Status: RO marks the message read");
    assert_eq!(
        sale.list_unsubscribe.as_deref(),
        Some("<https://deals.shop.com/unsubscribe?id=42>")
    );
}

#[test]
fn test_eml_progress_and_non_eml_files() {
    let dir = assert_fs::TempDir::new().unwrap();
    for (name, subject) in [("a.eml", "First"), ("b.EML", "Second")] {
        dir.child(name)
            .write_str(&format!(
                "From: x@y.com\r\nSubject: {subject}\r\nDate: Fri, 15 Mar 2024 09:00:00 +0000\r\n\r\nBody\r\n"
            ))
            .unwrap();
    }
    dir.child("notes.txt").write_str("not a message").unwrap();
    dir.child("archive/old.eml")
        .write_str("From: z@y.com\r\nSubject: Old\r\nDate: Mon, 01 Jan 2024 09:00:00 +0000\r\n\r\nOld\r\n")
        .unwrap();

    let calls = Cell::new(0u64);
    let last_total = Cell::new(0u64);
    let source = EmlDirSource::load(
        dir.path(),
        Some(&|_loaded, total| {
            calls.set(calls.get() + 1);
            last_total.set(total);
        }),
    )
    .unwrap();

    assert_eq!(source.records().len(), 3);
    assert_eq!(calls.get(), 3);
    assert_eq!(last_total.get(), 3);
    // "a.eml" < "archive/" < "b.EML"
    assert_eq!(source.records()[0].subject, "First");
    assert_eq!(
        source.records()[1].folder,
        Folder::Other("archive".to_string())
    );
}

// ─── open() dispatch ────────────────────────────────────────────────

#[test]
fn test_open_dispatches_on_path_kind() {
    let json = source::open(&fixture("records.json"), None).unwrap();
    assert_eq!(json.fetch_records(None, 0, None).unwrap().len(), 7);

    let eml = source::open(&fixture("maildir"), None).unwrap();
    assert_eq!(eml.fetch_records(None, 0, None).unwrap().len(), 3);
    assert!(eml.name().ends_with("maildir"));
}

#[test]
fn test_open_missing_path() {
    let Err(err) = source::open(Path::new("/definitely/not/here.json"), None) else {
        panic!("missing path opened");
    };
    assert!(matches!(err, SiftError::FileNotFound(_)));
    assert!(!err.is_parse_error());
}
