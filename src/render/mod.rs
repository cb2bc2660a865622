//! Output rendering: pure formatting of already computed results.
//!
//! Nothing here filters or aggregates. `text` draws tables and bar charts,
//! `json` serializes with stable camelCase field names.

pub mod json;
pub mod text;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};

use crate::config::DisplayConfig;
use crate::error::Result;
use crate::model::record::EmailRecord;
use crate::search::query::{OutputFormat, Query};
use crate::stats::Report;
use crate::time_range::TimeRange;
use crate::unsubscribe::SenderLinks;

/// Everything a renderer can be asked to draw.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    /// Grouped statistics for a query.
    Stats {
        query: &'a Query,
        report: &'a Report,
    },
    /// Matched records, already sorted.
    List {
        query: &'a Query,
        records: &'a [EmailRecord],
    },
    /// Period report: summary, top senders and the records of one range.
    Period {
        range: &'a TimeRange,
        report: &'a Report,
        records: &'a [EmailRecord],
        generated_at: DateTime<FixedOffset>,
    },
    /// Unsubscribe links grouped by sender, found among `scanned` matches.
    Unsubscribe {
        query: &'a Query,
        scanned: usize,
        senders: &'a [SenderLinks],
    },
}

/// Layout knobs for text output.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Width of the longest bar in a chart.
    pub bar_width: usize,
    pub date_format: String,
    pub subject_width: usize,
    /// Characters of body shown in period reports.
    pub preview_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for RenderOptions {
    fn from(display: &DisplayConfig) -> Self {
        let date_format = if valid_date_format(&display.date_format) {
            display.date_format.clone()
        } else {
            let rejected = &display.date_format;
            tracing::warn!(format = %rejected, "Invalid date_format, using default");
            DEFAULT_DATE_FORMAT.to_string()
        };
        Self {
            bar_width: display.bar_width.max(1),
            date_format,
            subject_width: display.subject_width.max(8),
            preview_chars: 100,
        }
    }
}

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `strftime` patterns chrono cannot format would panic at display time.
fn valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Render `view` in `format`.
pub fn render(view: &View<'_>, format: OutputFormat, options: &RenderOptions) -> Result<String> {
    match format {
        OutputFormat::Text => text::render(view, options),
        OutputFormat::Json => json::render(view),
    }
}
