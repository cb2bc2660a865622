//! Search engine: query parsing, predicate evaluation and the
//! `fetch → filter → aggregate` pipeline.

pub mod filter;
pub mod parser;
pub mod query;
pub mod size;

use std::cmp::Ordering;

use crate::error::Result;
use crate::model::record::EmailRecord;
use crate::source::RecordSource;
use crate::stats::{self, Report};

use self::query::{Query, SortBy};

/// Records per worker batch. Smaller sets are filtered on the calling thread.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Result of one query: the matched records (in `sort_by` order) and their
/// statistics.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub matched: Vec<EmailRecord>,
    pub report: Report,
    /// Records the source returned before local filtering.
    pub fetched: usize,
}

/// High-level search: fetch with the query's hints, filter locally, aggregate
/// and sort.
///
/// The source only sees the range's `since`; the full `[since, until)` range
/// and every other predicate are applied here.
pub fn execute(query: &Query, source: &dyn RecordSource) -> Result<SearchOutcome> {
    let since = query.filters.time_range.as_ref().map(|r| r.since);
    let records = source.fetch_records(since, query.limit, query.filters.folder.as_ref())?;

    let mut matched: Vec<EmailRecord> = filter_parallel(query, &records, DEFAULT_BATCH_SIZE)
        .into_iter()
        .cloned()
        .collect();

    let report = stats::aggregate(&matched, &query.aggregation);
    sort_records(&mut matched, query.aggregation.sort_by);

    tracing::info!(
        source = %source.name(),
        fetched = records.len(),
        matched = matched.len(),
        "Query executed"
    );

    Ok(SearchOutcome {
        matched,
        report,
        fetched: records.len(),
    })
}

/// Sequential filter, preserving input order.
pub fn filter_records<'a>(query: &Query, records: &'a [EmailRecord]) -> Vec<&'a EmailRecord> {
    records
        .iter()
        .filter(|e| filter::matches(query, e))
        .collect()
}

/// Filter `records` in batches of `batch_size` on scoped worker threads.
///
/// The result is ordered by record id whatever order the batches finish in.
pub fn filter_parallel<'a>(
    query: &Query,
    records: &'a [EmailRecord],
    batch_size: usize,
) -> Vec<&'a EmailRecord> {
    let batch_size = batch_size.max(1);
    let mut matched = if records.len() <= batch_size {
        filter_records(query, records)
    } else {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        // Never spawn more threads than cores; grow batches instead.
        let chunk = batch_size.max(records.len().div_ceil(workers));

        std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk)
                .map(|batch| scope.spawn(move || filter_records(query, batch)))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    };
    matched.sort_by_key(|e| e.id);
    matched
}

/// Order records for list output. Ties fall back to id so output is stable.
pub fn sort_records<R: std::borrow::Borrow<EmailRecord>>(records: &mut [R], sort_by: SortBy) {
    records.sort_by(|a, b| {
        let (a, b) = (a.borrow(), b.borrow());
        let primary = match sort_by {
            SortBy::Date => b.date.cmp(&a.date),
            SortBy::Size => b.size.cmp(&a.size),
            SortBy::Sender => a
                .from
                .address
                .to_lowercase()
                .cmp(&b.from.address.to_lowercase()),
        };
        match primary {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::parser::{QueryFlags, QueryParser};
    use crate::source::MemorySource;
    use chrono::{DateTime, Duration, FixedOffset};

    fn base() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-15T10:00:00+00:00").unwrap()
    }

    fn corpus(n: u64) -> Vec<EmailRecord> {
        (1..=n)
            .map(|id| {
                let from = if id % 3 == 0 { "spam@ads.com" } else { "friend@home.net" };
                let mut e = EmailRecord::new(
                    id,
                    from,
                    &format!("message {id}"),
                    base() - Duration::hours(id as i64),
                );
                e.size = id * 100;
                e
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records = corpus(5000);
        let mut query = Query::default();
        query.filters.exclude_domains.insert("ads.com".to_string());

        let sequential: Vec<u64> = filter_records(&query, &records).iter().map(|e| e.id).collect();
        let parallel: Vec<u64> = filter_parallel(&query, &records, 64)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 5000 - 5000 / 3);
    }

    #[test]
    fn test_parallel_orders_by_id() {
        let mut records = corpus(300);
        records.reverse();
        let ids: Vec<u64> = filter_parallel(&Query::default(), &records, 7)
            .iter()
            .map(|e| e.id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sort_records() {
        let mut records = corpus(5);
        sort_records(&mut records, SortBy::Size);
        assert_eq!(records[0].id, 5);
        sort_records(&mut records, SortBy::Date);
        assert_eq!(records[0].id, 1);
        sort_records(&mut records, SortBy::Sender);
        assert_eq!(records[0].from.address, "friend@home.net");
        assert_eq!(records[0].id, 1);
    }

    #[test]
    fn test_execute_applies_until_locally() {
        let source = MemorySource::new(corpus(48));
        let parser = QueryParser::new(base());
        let query = parser
            .parse(&["range=yesterday".to_string()], &QueryFlags::default())
            .unwrap();
        let outcome = execute(&query, &source).unwrap();
        // Hours 11..=34 before 2024-03-15T10:00 fall on 2024-03-14.
        assert_eq!(outcome.matched.len(), 24);
        assert_eq!(outcome.report.total_matched, 24);
        assert!(outcome.fetched > outcome.matched.len());
        assert_eq!(outcome.matched[0].id, 11);
    }
}
