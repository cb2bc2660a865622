//! Unsubscribe link discovery over matched records.
//!
//! Links come from the `List-Unsubscribe` header (RFC 2369), from URLs in
//! the plain or HTML body whose path looks like an opt-out page, from HTML
//! anchors whose text mentions unsubscribing, and from URLs on the line of
//! (or two lines after) the word "unsubscribe".

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::record::EmailRecord;

static HEADER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^>]+)>").expect("valid header URL regex"));

static OPT_OUT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)https?://[^\s<>"']*(?:unsubscribe|/unsub|/opt[-_]?out|preferences|/manage[^\s<>"']*subscription|/remove|/stop|/cancel|/leave|/sign-?out|/update[^\s<>"']*profile)[^\s<>"']*"#,
    )
    .expect("valid opt-out URL regex")
});

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("valid anchor regex")
});

static ANCHOR_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)unsubscribe|opt.?out|preferences|manage|stop.?receiv|sign.?out|update.?profile")
        .expect("valid anchor text regex")
});

static ANY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"|']+"#).expect("valid URL regex"));

/// Lines after an "unsubscribe" mention that are still searched for URLs.
const NEARBY_LINES: usize = 2;

/// Unsubscribe links found for one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderLinks {
    pub sender: String,
    /// Matched records from this sender carrying at least one link.
    pub count: usize,
    pub links: Vec<String>,
    /// Subject of the most recent such record.
    pub latest_subject: String,
}

/// Group unsubscribe links by sender, most frequent sender first.
pub fn find_links<'a, I>(records: I) -> Vec<SenderLinks>
where
    I: IntoIterator<Item = &'a EmailRecord>,
{
    struct Acc<'r> {
        count: usize,
        links: Vec<String>,
        seen: HashSet<String>,
        latest: &'r EmailRecord,
    }

    let mut by_sender: BTreeMap<String, Acc<'a>> = BTreeMap::new();
    for record in records {
        let links = extract_links(record);
        if links.is_empty() {
            continue;
        }
        let key = record.from.address.to_lowercase();
        let acc = by_sender.entry(key).or_insert_with(|| Acc {
            count: 0,
            links: Vec::new(),
            seen: HashSet::new(),
            latest: record,
        });
        acc.count += 1;
        if record.date > acc.latest.date {
            acc.latest = record;
        }
        for link in links {
            if acc.seen.insert(link.clone()) {
                acc.links.push(link);
            }
        }
    }

    let mut result: Vec<SenderLinks> = by_sender
        .into_iter()
        .map(|(sender, acc)| SenderLinks {
            sender,
            count: acc.count,
            links: acc.links,
            latest_subject: acc.latest.subject.clone(),
        })
        .collect();
    // Stable sort keeps the BTreeMap's sender order among equal counts.
    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

/// Unsubscribe links of one record, de-duplicated in discovery order.
pub fn extract_links(record: &EmailRecord) -> Vec<String> {
    let mut found = LinkSet::default();

    if let Some(header) = &record.list_unsubscribe {
        for cap in HEADER_URL.captures_iter(header) {
            found.push(&cap[1]);
        }
    }

    let bodies = std::iter::once(record.body.as_str()).chain(record.html.as_deref());
    for body in bodies {
        for m in OPT_OUT_URL.find_iter(body) {
            found.push(m.as_str());
        }

        for cap in ANCHOR.captures_iter(body) {
            if ANCHOR_TEXT.is_match(&cap[2]) {
                found.push(&cap[1]);
            }
        }

        let lines: Vec<&str> = body.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if !line.to_lowercase().contains("unsubscribe") {
                continue;
            }
            for nearby in lines.iter().skip(i).take(NEARBY_LINES + 1) {
                for m in ANY_URL.find_iter(nearby) {
                    found.push(m.as_str());
                }
            }
        }
    }

    found.links
}

#[derive(Default)]
struct LinkSet {
    seen: HashSet<String>,
    links: Vec<String>,
}

impl LinkSet {
    fn push(&mut self, raw: &str) {
        if let Some(url) = clean_url(raw) {
            if self.seen.insert(url.clone()) {
                self.links.push(url);
            }
        }
    }
}

/// Strip trailing punctuation, decode common entities, keep only http(s).
pub fn clean_url(raw: &str) -> Option<String> {
    let url = raw
        .trim()
        .trim_end_matches(['.', ',', ';', ':', ')', ']', '}', '\'', '"'])
        .replace("&amp;", "&")
        .replace("&quot;", "\"");
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}
