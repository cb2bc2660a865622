//! Structured query types produced by the parser and consumed by the
//! filter and the aggregator.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SiftError;
use crate::fuzzy::FuzzyConfig;
use crate::model::record::Folder;
use crate::time_range::TimeRange;

use super::size::human_size;

/// Default truncation for ranked lists.
pub const DEFAULT_TOP_N: usize = 10;

/// A fully parsed query.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub filters: FilterSet,
    pub aggregation: AggregationSpec,
    pub fuzzy: FuzzyConfig,
    /// Requested output format.
    pub format: OutputFormat,
    /// Maximum records to request from the source (`0` = no limit).
    pub limit: usize,
    /// Ignored `key=value` tokens.
    pub warnings: Vec<ParseWarning>,
}

impl Query {
    /// Compact human summary, e.g. `from:alice, unread, last 7 days, size>1 MiB`.
    pub fn describe(&self) -> String {
        let f = &self.filters;
        let mut parts = Vec::new();

        if let Some(from) = &f.from {
            parts.push(format!("from:{from}"));
        }
        if let Some(to) = &f.to {
            parts.push(format!("to:{to}"));
        }
        if let Some(subject) = &f.subject {
            parts.push(format!("subject:{subject}"));
        }
        if f.unread_only {
            parts.push("unread".to_string());
        }
        if let Some(range) = &f.time_range {
            parts.push(range.name.clone());
        }
        if let Some(folder) = &f.folder {
            parts.push(format!("folder:{folder}"));
        }
        match f.has_attachments {
            Some(true) => parts.push("with attachments".to_string()),
            Some(false) => parts.push("without attachments".to_string()),
            None => {}
        }
        if !f.include_domains.is_empty() {
            parts.push(format!("domains:{}", join(&f.include_domains)));
        }
        if !f.exclude_domains.is_empty() {
            parts.push(format!("-domains:{}", join(&f.exclude_domains)));
        }
        if !f.include_keywords.is_empty() {
            parts.push(format!("keywords:{}", join(&f.include_keywords)));
        }
        if !f.exclude_keywords.is_empty() {
            parts.push(format!("-keywords:{}", join(&f.exclude_keywords)));
        }
        match (f.min_size, f.max_size) {
            (Some(min), Some(max)) => {
                parts.push(format!("size:{}-{}", human_size(min), human_size(max)))
            }
            (Some(min), None) => parts.push(format!("size>{}", human_size(min))),
            (None, Some(max)) => parts.push(format!("size<{}", human_size(max))),
            (None, None) => {}
        }
        if let Some(expr) = &f.expr {
            parts.push(format!("\"{expr}\""));
        }

        if parts.is_empty() {
            "all emails".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Record-level predicates. Every set field must hold (implicit AND).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    /// Resolved from `days` or `range` (range wins).
    pub time_range: Option<TimeRange>,
    pub unread_only: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// `Some(true)` requires attachments, `Some(false)` forbids them.
    pub has_attachments: Option<bool>,
    pub folder: Option<Folder>,
    pub include_domains: BTreeSet<String>,
    pub exclude_domains: BTreeSet<String>,
    pub include_keywords: BTreeSet<String>,
    pub exclude_keywords: BTreeSet<String>,
    /// Boolean combinator tree from a free-text query.
    pub expr: Option<Expr>,
}

impl FilterSet {
    /// `true` when no predicate is set and every record matches.
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.to.is_none()
            && self.subject.is_none()
            && self.time_range.is_none()
            && !self.unread_only
            && self.min_size.is_none()
            && self.max_size.is_none()
            && self.has_attachments.is_none()
            && self.folder.is_none()
            && self.include_domains.is_empty()
            && self.exclude_domains.is_empty()
            && self.include_keywords.is_empty()
            && self.exclude_keywords.is_empty()
            && self.expr.is_none()
    }
}

/// Grouping, ordering and truncation of the matched set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSpec {
    pub group_by: GroupBy,
    pub sort_by: SortBy,
    pub top_n: usize,
}

impl Default for AggregationSpec {
    fn default() -> Self {
        Self {
            group_by: GroupBy::None,
            sort_by: SortBy::Date,
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Bucket key for grouped statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    None,
    Sender,
    Domain,
    Date,
    Hour,
    Weekday,
}

impl FromStr for GroupBy {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "sender" | "from" => Ok(Self::Sender),
            "domain" => Ok(Self::Domain),
            "date" | "day" => Ok(Self::Date),
            "hour" => Ok(Self::Hour),
            "weekday" | "dow" => Ok(Self::Weekday),
            _ => Err(SiftError::invalid_value("group-by", s)),
        }
    }
}

/// Ordering of list output when nothing is grouped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Most recent first.
    #[default]
    Date,
    /// Largest first.
    Size,
    /// Sender address ascending.
    Sender,
}

impl FromStr for SortBy {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "size" => Ok(Self::Size),
            "sender" | "from" => Ok(Self::Sender),
            _ => Err(SiftError::invalid_value("sort-by", s)),
        }
    }
}

/// Output format requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" | "table" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(SiftError::invalid_value("format", s)),
        }
    }
}

/// Which record fields a text atom looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Subject and plain-text body.
    Text,
    From,
    To,
    Subject,
    Body,
}

impl Field {
    /// Field for a `prefix:` in free text.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            "subject" => Some(Self::Subject),
            "body" => Some(Self::Body),
            "keywords" | "keyword" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Text => "keywords",
            Self::From => "from",
            Self::To => "to",
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }
}

/// A leaf of the combinator tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Atom {
    pub field: Field,
    pub text: String,
    /// Quoted phrases match exactly (substring, no fuzzy).
    pub exact: bool,
}

impl Atom {
    pub fn fuzzy(field: Field, text: impl Into<String>) -> Self {
        Self {
            field,
            text: text.into(),
            exact: false,
        }
    }
}

/// Boolean combinator tree over atoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Expr {
    Atom(Atom),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Flattening constructor: a single child is returned as-is.
    pub fn and(mut children: Vec<Expr>) -> Expr {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::And(children)
        }
    }

    /// Flattening constructor: a single child is returned as-is.
    pub fn or(mut children: Vec<Expr>) -> Expr {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::Or(children)
        }
    }

    pub fn not(child: Expr) -> Expr {
        Expr::Not(Box::new(child))
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn list(f: &mut std::fmt::Formatter<'_>, items: &[Expr], op: &str) -> std::fmt::Result {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, ")")
        }

        match self {
            Expr::Atom(atom) => {
                if atom.field != Field::Text {
                    write!(f, "{}:", atom.field.prefix())?;
                }
                if atom.exact {
                    write!(f, "\"{}\"", atom.text)
                } else {
                    write!(f, "{}", atom.text)
                }
            }
            Expr::And(items) => list(f, items, "AND"),
            Expr::Or(items) => list(f, items, "OR"),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// A non-fatal parser remark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ParseWarning {
    /// A `key=value` token with an unrecognised key.
    UnknownKey { key: String, value: String },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKey { key, value } => write!(f, "ignored unknown option '{key}={value}'"),
        }
    }
}
