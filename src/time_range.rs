//! Time range resolution: named presets, day counts and ISO date ranges.
//!
//! Every resolved range is half-open, `[since, until)`, and carries an explicit
//! `until` even when it ends "now". Record sources can usually only apply the
//! lower bound, so the filter always re-checks the full range locally.
//!
//! # Supported tokens (case-insensitive)
//!
//! - Presets: `last hour`, `today`, `yesterday`, `this morning`,
//!   `yesterday morning`, `this week`, `last week`, `this month`,
//!   `last month`, `this year`
//! - Day counts: `7`, `last 7 days`
//! - Dates: `2024-03-01` (one whole day), `2024-03-01,2024-03-31`,
//!   `2024-03-01 to 2024-03-31`, `2024-03-01..2024-03-31`

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta};
use serde::Serialize;

use crate::error::{Result, SiftError};

/// A concrete `[since, until)` interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// Canonical name (`"yesterday"`, `"last 7 days"`, `"2024-03-01,2024-03-31"`).
    pub name: String,
    pub since: DateTime<FixedOffset>,
    pub until: DateTime<FixedOffset>,
}

impl TimeRange {
    /// `true` if `ts` falls inside `[since, until)`.
    pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
        *ts >= self.since && *ts < self.until
    }

    /// The last `days` days up to `now`.
    pub fn last_days(days: u64, now: DateTime<FixedOffset>) -> Result<Self> {
        let since = now
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| SiftError::InvalidTimeRange(days.to_string()))?;
        Ok(Self {
            name: format!("last {days} days"),
            since,
            until: now,
        })
    }
}

/// Named shorthand ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    LastHour,
    Today,
    Yesterday,
    ThisMorning,
    YesterdayMorning,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
}

impl Preset {
    /// Every preset, in the order they are listed to users.
    pub const ALL: [Preset; 10] = [
        Self::LastHour,
        Self::Today,
        Self::Yesterday,
        Self::ThisMorning,
        Self::YesterdayMorning,
        Self::ThisWeek,
        Self::LastWeek,
        Self::ThisMonth,
        Self::LastMonth,
        Self::ThisYear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LastHour => "last hour",
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisMorning => "this morning",
            Self::YesterdayMorning => "yesterday morning",
            Self::ThisWeek => "this week",
            Self::LastWeek => "last week",
            Self::ThisMonth => "this month",
            Self::LastMonth => "last month",
            Self::ThisYear => "this year",
        }
    }

    /// Look up a preset by its normalized name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Compute the preset against `now`. Weeks start on Monday; day, month
    /// and year boundaries use the offset of `now`.
    pub fn resolve(self, now: DateTime<FixedOffset>) -> Result<TimeRange> {
        let offset = *now.offset();
        let today = now.date_naive();
        let err = || SiftError::InvalidTimeRange(self.name().to_string());
        let at = |date: NaiveDate, hour: u32| -> Result<DateTime<FixedOffset>> {
            local_time(date, hour, offset).ok_or_else(err)
        };

        let yesterday = today.pred_opt().ok_or_else(err)?;
        let week_start = today
            .checked_sub_days(Days::new(u64::from(now.weekday().num_days_from_monday())))
            .ok_or_else(err)?;
        let month_start = today.with_day(1).ok_or_else(err)?;

        let (since, until) = match self {
            Self::LastHour => (now - TimeDelta::hours(1), now),
            Self::Today => (at(today, 0)?, now),
            Self::Yesterday => (at(yesterday, 0)?, at(today, 0)?),
            Self::ThisMorning => (at(today, 6)?, at(today, 12)?),
            Self::YesterdayMorning => (at(yesterday, 6)?, at(yesterday, 12)?),
            Self::ThisWeek => (at(week_start, 0)?, now),
            Self::LastWeek => {
                let prev = week_start.checked_sub_days(Days::new(7)).ok_or_else(err)?;
                (at(prev, 0)?, at(week_start, 0)?)
            }
            Self::ThisMonth => (at(month_start, 0)?, now),
            Self::LastMonth => {
                let prev = month_start
                    .checked_sub_months(Months::new(1))
                    .ok_or_else(err)?;
                (at(prev, 0)?, at(month_start, 0)?)
            }
            Self::ThisYear => {
                let jan1 = NaiveDate::from_ymd_opt(today.year(), 1, 1).ok_or_else(err)?;
                (at(jan1, 0)?, now)
            }
        };

        Ok(TimeRange {
            name: self.name().to_string(),
            since,
            until,
        })
    }
}

/// Resolve a time token against `now`.
///
/// Fails with [`SiftError::InvalidTimeRange`] (quoting `token`) when nothing matches.
pub fn resolve(token: &str, now: DateTime<FixedOffset>) -> Result<TimeRange> {
    let normalized = normalize(token);
    let invalid = || SiftError::InvalidTimeRange(token.trim().to_string());

    if normalized.is_empty() {
        return Err(invalid());
    }

    if let Some(preset) = Preset::from_name(&normalized) {
        return preset.resolve(now);
    }

    if let Some(days) = parse_day_count(&normalized) {
        return TimeRange::last_days(days, now).map_err(|_| invalid());
    }

    let offset = *now.offset();

    if let Some((first, second)) = split_range(&normalized) {
        let start = parse_iso_date(first).ok_or_else(invalid)?;
        let end = parse_iso_date(second).ok_or_else(invalid)?;
        if start > end {
            return Err(invalid());
        }
        let end_excl = end.succ_opt().ok_or_else(invalid)?;
        return Ok(TimeRange {
            name: format!("{start},{end}"),
            since: local_time(start, 0, offset).ok_or_else(invalid)?,
            until: local_time(end_excl, 0, offset).ok_or_else(invalid)?,
        });
    }

    if let Some(day) = parse_iso_date(&normalized) {
        let next = day.succ_opt().ok_or_else(invalid)?;
        return Ok(TimeRange {
            name: day.to_string(),
            since: local_time(day, 0, offset).ok_or_else(invalid)?,
            until: local_time(next, 0, offset).ok_or_else(invalid)?,
        });
    }

    Err(invalid())
}

/// The preset catalogue resolved against `now`, in listing order.
pub fn presets(now: DateTime<FixedOffset>) -> Vec<TimeRange> {
    Preset::ALL
        .into_iter()
        .filter_map(|p| p.resolve(now).ok())
        .collect()
}

/// Lower-case, treat `_`/`-` between words as spaces, collapse whitespace.
/// Dashes inside ISO dates are preserved.
fn normalize(token: &str) -> String {
    let lowered = token.trim().to_lowercase();
    let words: Vec<String> = lowered
        .split_whitespace()
        .map(|w| {
            if w.starts_with(|c: char| c.is_ascii_alphabetic()) {
                w.replace(['_', '-'], " ")
            } else {
                w.to_string()
            }
        })
        .collect();
    words.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"7"`, `"last 7 days"`, `"past 1 day"` → `7`.
fn parse_day_count(s: &str) -> Option<u64> {
    if let Ok(n) = s.parse::<u64>() {
        return Some(n);
    }
    let rest = s.strip_prefix("last ").or_else(|| s.strip_prefix("past "))?;
    let num = rest
        .strip_suffix(" days")
        .or_else(|| rest.strip_suffix(" day"))?;
    num.trim().parse().ok()
}

fn split_range(s: &str) -> Option<(&str, &str)> {
    s.split_once(',')
        .or_else(|| s.split_once(" to "))
        .or_else(|| s.split_once(".."))
        .map(|(a, b)| (a.trim(), b.trim()))
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// `date` at `hour:00` in the given offset.
fn local_time(date: NaiveDate, hour: u32, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    date.and_time(time).and_local_timezone(offset).single()
}
