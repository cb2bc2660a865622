//! Centralized error types for mailsift.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsift library.
///
/// Parse errors quote the offending token so the CLI can print it verbatim.
/// An empty result set is not an error: see [`crate::stats::Report::is_empty`].
#[derive(Error, Debug)]
pub enum SiftError {
    /// A time token matched no preset and is not one or two ISO dates.
    #[error("Invalid time range: '{0}'")]
    InvalidTimeRange(String),

    /// A size literal has a bad number or an unknown suffix.
    #[error("Invalid size literal: '{0}'")]
    InvalidSizeLiteral(String),

    /// A free-text boolean query is malformed (dangling operator, unbalanced parens, ...).
    #[error("Invalid boolean query '{query}': {reason}")]
    InvalidBooleanQuery { query: String, reason: String },

    /// A recognised option carries a value that does not parse.
    #[error("Invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The record source does not exist.
    #[error("Record source not found: {0}")]
    FileNotFound(PathBuf),

    /// A record file exists but could not be decoded.
    #[error("Invalid records in '{path}': {reason}")]
    InvalidRecords { path: PathBuf, reason: String },

    /// JSON output could not be produced.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Text output could not be formatted.
    #[error("Text formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Convenience alias for `Result<T, SiftError>`.
pub type Result<T> = std::result::Result<T, SiftError>;

impl SiftError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`SiftError::InvalidValue`].
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Short machine-friendly name of the error kind, printed by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTimeRange(_) => "InvalidTimeRange",
            Self::InvalidSizeLiteral(_) => "InvalidSizeLiteral",
            Self::InvalidBooleanQuery { .. } => "InvalidBooleanQuery",
            Self::InvalidValue { .. } => "InvalidValue",
            Self::Io { .. } => "Io",
            Self::FileNotFound(_) => "FileNotFound",
            Self::InvalidRecords { .. } => "InvalidRecords",
            Self::Json(_) => "Json",
            Self::Format(_) => "Format",
        }
    }

    /// Whether this error came from parsing user input (as opposed to reading records).
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeRange(_)
                | Self::InvalidSizeLiteral(_)
                | Self::InvalidBooleanQuery { .. }
                | Self::InvalidValue { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `SiftError::io`).
impl From<std::io::Error> for SiftError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
