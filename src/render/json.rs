//! JSON output for piping into other tools.

use serde::Serialize;

use crate::error::Result;
use crate::model::record::EmailRecord;
use crate::stats::Report;
use crate::time_range::TimeRange;
use crate::unsubscribe::SenderLinks;

use super::View;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsDoc<'a> {
    query: String,
    #[serde(flatten)]
    report: &'a Report,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListDoc {
    query: String,
    total_matched: usize,
    records: Vec<RecordSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodDoc<'a> {
    range: &'a TimeRange,
    generated_at: String,
    #[serde(flatten)]
    report: &'a Report,
    records: Vec<RecordSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeDoc<'a> {
    query: String,
    total_matched: usize,
    total_senders: usize,
    senders: &'a [SenderLinks],
}

/// Header-level view of a record (no bodies).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: u64,
    pub date: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub size: u64,
    pub unread: bool,
    pub folder: String,
    pub attachments: Vec<String>,
}

impl From<&EmailRecord> for RecordSummary {
    fn from(e: &EmailRecord) -> Self {
        Self {
            id: e.id,
            date: e.date.to_rfc3339(),
            from: e.from.display(),
            to: e.to.iter().map(|a| a.display()).collect(),
            subject: e.subject.clone(),
            size: e.size,
            unread: e.unread,
            folder: e.folder.to_string(),
            attachments: e.attachments.clone(),
        }
    }
}

fn summaries(records: &[EmailRecord]) -> Vec<RecordSummary> {
    records.iter().map(RecordSummary::from).collect()
}

/// Pretty-printed JSON document for `view`.
pub fn render(view: &View<'_>) -> Result<String> {
    let out = match *view {
        View::Stats { query, report } => serde_json::to_string_pretty(&StatsDoc {
            query: query.describe(),
            report,
        })?,
        View::List { query, records } => serde_json::to_string_pretty(&ListDoc {
            query: query.describe(),
            total_matched: records.len(),
            records: summaries(records),
        })?,
        View::Period {
            range,
            report,
            records,
            generated_at,
        } => serde_json::to_string_pretty(&PeriodDoc {
            range,
            generated_at: generated_at.to_rfc3339(),
            report,
            records: summaries(records),
        })?,
        View::Unsubscribe {
            query,
            scanned,
            senders,
        } => serde_json::to_string_pretty(&UnsubscribeDoc {
            query: query.describe(),
            total_matched: scanned,
            total_senders: senders.len(),
            senders,
        })?,
    };
    Ok(out)
}
