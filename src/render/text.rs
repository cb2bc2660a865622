//! Human-readable output: aligned tables and horizontal bar charts.

use std::fmt::{self, Write as _};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::Result;
use crate::model::record::EmailRecord;
use crate::search::query::{GroupBy, Query};
use crate::search::size::human_size;
use crate::stats::{Group, Report, WEEKDAYS};
use crate::time_range::TimeRange;
use crate::unsubscribe::SenderLinks;

use super::{RenderOptions, View};

/// Full block for bar bodies.
pub const BAR_CHAR: char = '█';
/// Drawn instead of an empty bar so the axis stays visible.
pub const TICK_CHAR: char = '▏';

const RULE_WIDTH: usize = 64;

/// Render `view` as text. Always ends with a newline.
pub fn render(view: &View<'_>, opts: &RenderOptions) -> Result<String> {
    let mut out = String::new();
    match *view {
        View::Stats { query, report } => stats(&mut out, query, report, opts)?,
        View::List { query, records } => list(&mut out, query, records, opts)?,
        View::Period {
            range,
            report,
            records,
            generated_at,
        } => {
            period(&mut out, range, report, records, opts)?;
            writeln!(out, "Report generated at {}", generated_at.format(&opts.date_format))?;
        }
        View::Unsubscribe {
            query,
            scanned,
            senders,
        } => {
            if scanned == 0 {
                no_matches(&mut out, query)?;
            } else {
                unsubscribe(&mut out, senders)?;
            }
        }
    }
    Ok(out)
}

/// Bar of `round(count / max * width)` blocks; a zero-length bar is a tick.
pub fn bar(count: usize, max: usize, width: usize) -> String {
    let len = if max == 0 {
        0
    } else {
        (count as f64 / max as f64 * width as f64).round() as usize
    };
    if len == 0 {
        TICK_CHAR.to_string()
    } else {
        BAR_CHAR.to_string().repeat(len.min(width))
    }
}

/// Truncate to `max_width` display columns, marking the cut with "...".
pub fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return s.chars().take(max_width).collect();
    }
    let mut result = String::new();
    let mut current = 0;
    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if current + w + 3 > max_width {
            break;
        }
        result.push(ch);
        current += w;
    }
    result.push_str("...");
    result
}

/// Left-align in `width` display columns, truncating if needed.
pub fn pad(s: &str, width: usize) -> String {
    let cell = truncate(s, width);
    let fill = width.saturating_sub(UnicodeWidthStr::width(cell.as_str()));
    format!("{cell}{}", " ".repeat(fill))
}

fn no_matches(out: &mut String, query: &Query) -> fmt::Result {
    writeln!(out, "No emails matched ({}).", query.describe())
}

fn stats(out: &mut String, query: &Query, report: &Report, opts: &RenderOptions) -> fmt::Result {
    if report.is_empty() {
        return no_matches(out, query);
    }

    summary(out, &query.describe(), report)?;

    if report.group_by != GroupBy::None {
        let title = match report.group_by {
            GroupBy::Sender => "By sender",
            GroupBy::Domain => "By domain",
            GroupBy::Date => "By date",
            GroupBy::Hour => "By hour",
            GroupBy::Weekday => "By weekday",
            GroupBy::None => "",
        };
        chart(out, title, &report.groups, opts.bar_width, true)?;
    }

    ranked(out, "Top senders", &report.top_senders)?;
    ranked(out, "Top domains", &report.top_domains)?;
    ranked(out, "Top keywords", &report.top_keywords)?;

    if !matches!(report.group_by, GroupBy::Hour | GroupBy::Weekday) {
        let hours: Vec<Group> = report
            .histogram_hour
            .iter()
            .enumerate()
            .map(|(h, &count)| axis_bucket(format!("{h:02}:00"), count))
            .collect();
        chart(out, "Activity by hour", &hours, opts.bar_width, false)?;

        let days: Vec<Group> = report
            .histogram_weekday
            .iter()
            .zip(WEEKDAYS)
            .map(|(&count, day)| axis_bucket(day.to_string(), count))
            .collect();
        chart(out, "Activity by weekday", &days, opts.bar_width, false)?;
    }
    Ok(())
}

fn axis_bucket(key: String, count: usize) -> Group {
    Group {
        key,
        count,
        percent: 0.0,
    }
}

fn summary(out: &mut String, description: &str, report: &Report) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "  {:<20} {}", "Query", description)?;
    writeln!(out, "  {:<20} {}", "Matched", report.total_matched)?;
    writeln!(out, "  {:<20} {}", "Unread", report.unread)?;
    writeln!(
        out,
        "  {:<20} {} ({:.1}%)",
        "With attachments",
        report.with_attachments,
        report.with_attachments as f64 / report.total_matched.max(1) as f64 * 100.0
    )?;
    writeln!(out, "  {:<20} {}", "Total size", human_size(report.total_size))?;
    if let (Some(first), Some(last)) = (report.first_date, report.last_date) {
        writeln!(
            out,
            "  {:<20} {} to {}",
            "Date range",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        )?;
    }
    Ok(())
}

/// Labelled bar chart, one row per bucket.
fn chart(
    out: &mut String,
    title: &str,
    buckets: &[Group],
    width: usize,
    with_percent: bool,
) -> fmt::Result {
    if buckets.is_empty() {
        return Ok(());
    }
    let max = buckets.iter().map(|g| g.count).max().unwrap_or(0);
    let key_width = buckets
        .iter()
        .map(|g| UnicodeWidthStr::width(g.key.as_str()))
        .max()
        .unwrap_or(0)
        .min(40);

    writeln!(out)?;
    writeln!(out, "  {title}:")?;
    for g in buckets {
        let bar = bar(g.count, max, width);
        write!(
            out,
            "    {} {} {}",
            pad(&g.key, key_width),
            pad(&bar, width),
            g.count
        )?;
        if with_percent {
            write!(out, " ({:.1}%)", g.percent)?;
        }
        out.push('\n');
    }
    Ok(())
}

fn ranked(out: &mut String, title: &str, items: &[Group]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "  {title}:")?;
    for g in items {
        writeln!(out, "    {:>6}  {}", g.count, g.key)?;
    }
    Ok(())
}

fn list(
    out: &mut String,
    query: &Query,
    records: &[EmailRecord],
    opts: &RenderOptions,
) -> fmt::Result {
    if records.is_empty() {
        return no_matches(out, query);
    }

    let date_width = UnicodeWidthStr::width(
        chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
            .format(&opts.date_format)
            .to_string()
            .as_str(),
    )
    .max(4);
    let from_width = 28;

    writeln!(
        out,
        "{} matching email(s): {}",
        records.len(),
        query.describe()
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "  {:>5}  {}  {}  {}  {:>10}  FLAGS",
        "ID",
        pad("DATE", date_width),
        pad("FROM", from_width),
        pad("SUBJECT", opts.subject_width),
        "SIZE"
    )?;
    for e in records {
        let mut flags = String::new();
        if e.unread {
            flags.push('U');
        }
        if e.has_attachments() {
            flags.push('A');
        }
        writeln!(
            out,
            "  {:>5}  {}  {}  {}  {:>10}  {}",
            e.id,
            pad(&e.date.format(&opts.date_format).to_string(), date_width),
            pad(&sender_label(e), from_width),
            pad(&e.subject, opts.subject_width),
            human_size(e.size),
            flags
        )?;
    }
    Ok(())
}

fn sender_label(e: &EmailRecord) -> String {
    if e.from.display_name.is_empty() {
        e.from.address.clone()
    } else {
        e.from.display_name.clone()
    }
}

fn period(
    out: &mut String,
    range: &TimeRange,
    report: &Report,
    records: &[EmailRecord],
    opts: &RenderOptions,
) -> fmt::Result {
    let rule = "═".repeat(RULE_WIDTH);
    let thin = "─".repeat(RULE_WIDTH);

    writeln!(out, "Email Report")?;
    writeln!(out, "{rule}")?;
    writeln!(out)?;
    writeln!(out, "Time range: {}", range.name)?;
    writeln!(
        out,
        "Period: {} to {}",
        range.since.format(&opts.date_format),
        range.until.format(&opts.date_format)
    )?;
    writeln!(out, "Total emails: {}", report.total_matched)?;
    writeln!(out)?;

    if report.is_empty() {
        return writeln!(out, "No emails found in this time range.");
    }

    writeln!(
        out,
        "Unread: {}   With attachments: {}   Total size: {}",
        report.unread,
        report.with_attachments,
        human_size(report.total_size)
    )?;
    writeln!(out)?;

    writeln!(out, "Top senders:")?;
    writeln!(out, "{thin}")?;
    for g in &report.top_senders {
        writeln!(out, "  • {} ({} emails)", g.key, g.count)?;
    }
    writeln!(out)?;

    writeln!(out, "Email list:")?;
    writeln!(out, "{thin}")?;
    for (i, e) in records.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "{}. From: {}", i + 1, e.from.display())?;
        writeln!(out, "   Subject: {}", e.subject)?;
        writeln!(out, "   Date: {}", e.date.format(&opts.date_format))?;
        if e.has_attachments() {
            writeln!(out, "   Attachments: {}", e.attachments.len())?;
        }
        let preview = preview(&e.body, opts.preview_chars);
        if !preview.is_empty() {
            writeln!(out, "   Preview: {preview}")?;
        }
    }
    writeln!(out)?;
    writeln!(out, "{rule}")
}

/// First `chars` characters of `body` on one line.
fn preview(body: &str, chars: usize) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > chars {
        let cut: String = flat.chars().take(chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn unsubscribe(out: &mut String, senders: &[SenderLinks]) -> fmt::Result {
    if senders.is_empty() {
        return writeln!(out, "No unsubscribe links found.");
    }
    writeln!(
        out,
        "Found unsubscribe links from {} sender(s):",
        senders.len()
    )?;
    for (i, s) in senders.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "{}. {} ({} emails)", i + 1, s.sender, s.count)?;
        writeln!(out, "   Latest: {}", s.latest_subject)?;
        for link in &s.links {
            writeln!(out, "   - {link}")?;
        }
    }
    Ok(())
}
