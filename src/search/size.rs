//! Size literals: an integer optionally followed by `b`, `kb`, `mb`, `gb`,
//! `k`, `m` or `g` (case-insensitive).
//!
//! Two conventions coexist: `kb`/`mb`/`gb` are binary (powers of 1024) while
//! the bare `k`/`m`/`g` are decimal (powers of 1000).

use crate::error::{Result, SiftError};

/// A size suffix and its multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Bytes,
    Kib,
    Mib,
    Gib,
    Kilo,
    Mega,
    Giga,
}

impl SizeUnit {
    /// Longest suffixes first so `mb` is not read as `b`.
    const BY_SUFFIX: [(&'static str, SizeUnit); 7] = [
        ("kb", SizeUnit::Kib),
        ("mb", SizeUnit::Mib),
        ("gb", SizeUnit::Gib),
        ("k", SizeUnit::Kilo),
        ("m", SizeUnit::Mega),
        ("g", SizeUnit::Giga),
        ("b", SizeUnit::Bytes),
    ];

    pub fn multiplier(self) -> u64 {
        match self {
            Self::Bytes => 1,
            Self::Kib => 1024,
            Self::Mib => 1024 * 1024,
            Self::Gib => 1024 * 1024 * 1024,
            Self::Kilo => 1000,
            Self::Mega => 1_000_000,
            Self::Giga => 1_000_000_000,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Bytes => "b",
            Self::Kib => "kb",
            Self::Mib => "mb",
            Self::Gib => "gb",
            Self::Kilo => "k",
            Self::Mega => "m",
            Self::Giga => "g",
        }
    }

    /// Render `count` units as a literal, e.g. `SizeUnit::Mib.format(5)` → `"5mb"`.
    pub fn format(self, count: u64) -> String {
        format!("{count}{}", self.suffix())
    }
}

/// Parse a size literal into bytes.
pub fn parse_size(literal: &str) -> Result<u64> {
    let invalid = || SiftError::InvalidSizeLiteral(literal.trim().to_string());
    let lowered = literal.trim().to_ascii_lowercase();

    let (digits, unit) = SizeUnit::BY_SUFFIX
        .iter()
        .find_map(|(suffix, unit)| lowered.strip_suffix(suffix).map(|n| (n, *unit)))
        .unwrap_or((lowered.as_str(), SizeUnit::Bytes));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    count.checked_mul(unit.multiplier()).ok_or_else(invalid)
}

/// Human-readable binary size (`"1.5 MiB"`) for display.
pub fn human_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
