//! Aggregation of a matched record set into a [`Report`].
//!
//! Grouped counts, percentages, ranked top lists and hour/weekday/date
//! histograms. A zero-match set yields an empty report, never an error.

pub mod keywords;

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::Serialize;

use crate::model::record::EmailRecord;
use crate::search::query::{AggregationSpec, GroupBy};

/// Weekday labels in axis order.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Date bucket key format.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

const UNKNOWN_SENDER: &str = "(unknown)";

/// One bucket of a grouped or ranked list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    pub count: usize,
    /// Share of `total_matched`, in percent.
    pub percent: f64,
}

/// Statistics over one matched set.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total_matched: usize,
    pub group_by: GroupBy,
    /// Buckets for `group_by`. Ranked groups are sorted and truncated;
    /// hour and weekday groups are complete and in axis order.
    pub groups: Vec<Group>,
    /// Per-day counts in chronological order, days without mail omitted.
    pub histogram: Vec<Group>,
    pub histogram_hour: [usize; 24],
    pub histogram_weekday: [usize; 7],
    pub top_senders: Vec<Group>,
    pub top_domains: Vec<Group>,
    pub top_keywords: Vec<Group>,
    pub unread: usize,
    pub with_attachments: usize,
    pub total_size: u64,
    pub first_date: Option<DateTime<FixedOffset>>,
    pub last_date: Option<DateTime<FixedOffset>>,
}

impl Report {
    /// `true` when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.total_matched == 0
    }
}

/// Aggregate `matched` according to `spec`.
///
/// `spec.top_n == 0` disables truncation.
pub fn aggregate<R: Borrow<EmailRecord>>(matched: &[R], spec: &AggregationSpec) -> Report {
    let total = matched.len();
    let mut report = Report {
        total_matched: total,
        group_by: spec.group_by,
        ..Default::default()
    };
    if total == 0 {
        return report;
    }

    let mut senders: HashMap<String, usize> = HashMap::new();
    let mut domains: HashMap<String, usize> = HashMap::new();
    let mut days: BTreeMap<String, usize> = BTreeMap::new();
    let mut words: HashMap<String, usize> = HashMap::new();

    for record in matched {
        let e = record.borrow();
        *senders.entry(sender_key(e)).or_default() += 1;
        *domains.entry(domain_key(e)).or_default() += 1;
        *days.entry(e.date.format(DATE_KEY_FORMAT).to_string()).or_default() += 1;
        for word in keywords::extract(&e.subject) {
            *words.entry(word).or_default() += 1;
        }

        report.histogram_hour[e.date.hour() as usize] += 1;
        report.histogram_weekday[weekday_index(e.date.weekday())] += 1;

        if e.unread {
            report.unread += 1;
        }
        if e.has_attachments() {
            report.with_attachments += 1;
        }
        report.total_size = report.total_size.saturating_add(e.size);
        report.first_date = Some(report.first_date.map_or(e.date, |d| d.min(e.date)));
        report.last_date = Some(report.last_date.map_or(e.date, |d| d.max(e.date)));
    }

    report.histogram = days
        .iter()
        .map(|(k, &c)| group(k.clone(), c, total))
        .collect();

    report.groups = match spec.group_by {
        GroupBy::None => Vec::new(),
        GroupBy::Sender => ranked(senders.clone(), total, spec.top_n),
        GroupBy::Domain => ranked(domains.clone(), total, spec.top_n),
        GroupBy::Date => ranked(days, total, spec.top_n),
        GroupBy::Hour => report
            .histogram_hour
            .iter()
            .enumerate()
            .map(|(h, &c)| group(format!("{h:02}:00"), c, total))
            .collect(),
        GroupBy::Weekday => report
            .histogram_weekday
            .iter()
            .zip(WEEKDAYS)
            .map(|(&c, day)| group(day.to_string(), c, total))
            .collect(),
    };

    report.top_senders = ranked(senders, total, spec.top_n);
    report.top_domains = ranked(domains, total, spec.top_n);
    report.top_keywords = ranked(words, total, spec.top_n);

    tracing::debug!(
        total,
        groups = report.groups.len(),
        group_by = ?spec.group_by,
        "Aggregated matched records"
    );
    report
}

fn sender_key(e: &EmailRecord) -> String {
    if e.from.address.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        e.from.address.clone()
    }
}

fn domain_key(e: &EmailRecord) -> String {
    let domain = e.sender_domain();
    if domain.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        domain
    }
}

/// Monday = 0 … Sunday = 6.
pub fn weekday_index(day: Weekday) -> usize {
    day.num_days_from_monday() as usize
}

fn group(key: String, count: usize, total: usize) -> Group {
    let percent = if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    };
    Group {
        key,
        count,
        percent,
    }
}

/// Count descending, key ascending on ties, then truncate.
fn ranked<I>(counts: I, total: usize, top_n: usize) -> Vec<Group>
where
    I: IntoIterator<Item = (String, usize)>,
{
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if top_n > 0 {
        sorted.truncate(top_n);
    }
    sorted
        .into_iter()
        .map(|(key, count)| group(key, count, total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::SortBy;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn make_record(id: u64, from: &str, subject: &str, date: &str) -> EmailRecord {
        EmailRecord::new(id, from, subject, ts(date))
    }

    fn spec(group_by: GroupBy, top_n: usize) -> AggregationSpec {
        AggregationSpec {
            group_by,
            sort_by: SortBy::Date,
            top_n,
        }
    }

    fn corpus() -> Vec<EmailRecord> {
        let mut records = Vec::new();
        let mut id = 0;
        for (sender, n) in [("five@a.com", 5), ("three@b.com", 3), ("one@c.org", 1)] {
            for _ in 0..n {
                id += 1;
                records.push(make_record(
                    id,
                    sender,
                    "Weekly budget report",
                    "2024-03-11T09:15:00+02:00",
                ));
            }
        }
        records
    }

    #[test]
    fn test_empty_report() {
        let records: Vec<EmailRecord> = Vec::new();
        let report = aggregate(&records, &spec(GroupBy::Hour, 10));
        assert!(report.is_empty());
        assert!(report.groups.is_empty());
        assert_eq!(report.histogram_hour, [0; 24]);
    }

    #[test]
    fn test_group_by_sender_top_n() {
        let records = corpus();
        let report = aggregate(&records, &spec(GroupBy::Sender, 2));
        assert_eq!(report.total_matched, 9);
        let keys: Vec<&str> = report.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["five@a.com", "three@b.com"]);
        assert_eq!(report.groups[0].count, 5);
    }

    #[test]
    fn test_ties_broken_by_key() {
        let records = vec![
            make_record(1, "b@x.com", "x", "2024-03-11T09:00:00Z"),
            make_record(2, "a@x.com", "x", "2024-03-11T09:00:00Z"),
        ];
        let report = aggregate(&records, &spec(GroupBy::Sender, 10));
        assert_eq!(report.groups[0].key, "a@x.com");
        assert_eq!(report.groups[1].key, "b@x.com");
    }

    #[test]
    fn test_group_by_domain_and_percentages() {
        let records = corpus();
        let report = aggregate(&records, &spec(GroupBy::Domain, 10));
        assert_eq!(report.groups.len(), 3);
        let sum: f64 = report.groups.iter().map(|g| g.percent).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_hour_and_weekday_axes_are_complete() {
        let records = corpus();
        let report = aggregate(&records, &spec(GroupBy::Hour, 2));
        assert_eq!(report.groups.len(), 24);
        assert_eq!(report.groups[0].key, "00:00");
        // Local hour of the record's own offset
        assert_eq!(report.groups[9].count, 9);

        let report = aggregate(&records, &spec(GroupBy::Weekday, 1));
        assert_eq!(report.groups.len(), 7);
        assert_eq!(report.groups[0].key, "Monday");
        assert_eq!(report.groups[0].count, 9);
        assert_eq!(report.groups[6].count, 0);
    }

    #[test]
    fn test_group_by_date_and_histogram() {
        let records = vec![
            make_record(1, "a@x.com", "x", "2024-03-12T09:00:00Z"),
            make_record(2, "a@x.com", "x", "2024-03-10T09:00:00Z"),
            make_record(3, "a@x.com", "x", "2024-03-12T18:00:00Z"),
        ];
        let report = aggregate(&records, &spec(GroupBy::Date, 10));
        assert_eq!(report.groups[0].key, "2024-03-12");
        assert_eq!(report.groups[0].count, 2);
        let days: Vec<&str> = report.histogram.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(days, vec!["2024-03-10", "2024-03-12"]);
        assert_eq!(report.first_date, Some(ts("2024-03-10T09:00:00Z")));
        assert_eq!(report.last_date, Some(ts("2024-03-12T18:00:00Z")));
    }

    #[test]
    fn test_summary_counters_and_keywords() {
        let mut records = corpus();
        records[0].unread = true;
        records[1].attachments.push("a.pdf".to_string());
        records[2].size = 2048;
        let report = aggregate(&records, &spec(GroupBy::None, 10));
        assert!(report.groups.is_empty());
        assert_eq!(report.unread, 1);
        assert_eq!(report.with_attachments, 1);
        assert_eq!(report.total_size, 2048);
        let kw: Vec<&str> = report.top_keywords.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(kw, vec!["budget", "report", "weekly"]);
        assert_eq!(report.top_senders.len(), 3);
        assert_eq!(report.top_domains[0].key, "a.com");
    }

    #[test]
    fn test_missing_sender_is_bucketed() {
        let records = vec![make_record(1, "", "x", "2024-03-11T09:00:00Z")];
        let report = aggregate(&records, &spec(GroupBy::Sender, 10));
        assert_eq!(report.groups[0].key, "(unknown)");
    }

    #[test]
    fn test_accepts_references() {
        let records = corpus();
        let refs: Vec<&EmailRecord> = records.iter().collect();
        assert_eq!(aggregate(&refs, &spec(GroupBy::None, 10)).total_matched, 9);
    }
}
