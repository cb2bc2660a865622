//! Query parser: turns CLI flags, `key=value` tokens and free text into a [`Query`].
//!
//! Three surface forms are merged in priority order:
//!
//! 1. **Flags** already bound by the caller ([`QueryFlags`]). Never overridden.
//! 2. **`key=value` tokens** such as `from=john@x.com`, `min-size=5MB`,
//!    `group-by=sender`. Unknown keys become warnings, not errors.
//! 3. **Free text**, scanned for `AND` / `OR` / `NOT` (any case), parentheses,
//!    `-term` and field prefixes (`from:`, `to:`, `subject:`, `body:`,
//!    `keywords:`). Without any of those the whole string becomes one fuzzy
//!    subject+body keyword.
//!
//! Below those sit the configured [`QueryDefaults`].
//!
//! # Free-text grammar
//!
//! ```text
//! or    := and ( "OR" and )*
//! and   := unary ( "AND"? unary )*        adjacent terms are ANDed
//! unary := ( "NOT" | "-" ) unary | primary
//! primary := "(" or ")" | atom
//! atom  := [field ":"] word | "quoted phrase"
//! ```
//!
//! `NOT` binds tighter than `AND`, which binds tighter than `OR`, so
//! `urgent OR important AND NOT spam` reads as `urgent OR (important AND (NOT spam))`.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::error::{Result, SiftError};
use crate::fuzzy::FuzzyConfig;
use crate::model::record::Folder;
use crate::prefs::PreferenceResolver;
use crate::time_range::{self, TimeRange};

use super::query::{
    AggregationSpec, Atom, Expr, Field, FilterSet, GroupBy, OutputFormat, ParseWarning, Query,
    SortBy, DEFAULT_TOP_N,
};
use super::size::parse_size;

/// Options bound directly by the caller (CLI flags). Unset fields are `None`
/// or empty so lower-priority layers can fill them.
#[derive(Debug, Clone, Default)]
pub struct QueryFlags {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub days: Option<u64>,
    pub range: Option<String>,
    pub unread: Option<bool>,
    pub min_size: Option<String>,
    pub max_size: Option<String>,
    pub has_attachments: Option<bool>,
    pub folder: Option<String>,
    pub domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub keywords: Vec<String>,
    pub exclude_words: Vec<String>,
    pub group_by: Option<GroupBy>,
    pub sort_by: Option<SortBy>,
    pub top_n: Option<usize>,
    pub format: Option<OutputFormat>,
    pub fuzzy_threshold: Option<f64>,
    pub no_fuzzy: Option<bool>,
    pub case_sensitive: Option<bool>,
    pub limit: Option<usize>,
    /// A free-text query passed as an option rather than as positional words.
    pub query: Option<String>,
}

impl QueryFlags {
    /// Field-wise merge where values already set in `self` win over `lower`.
    pub fn merge_over(self, lower: QueryFlags) -> QueryFlags {
        fn list(upper: Vec<String>, lower: Vec<String>) -> Vec<String> {
            if upper.is_empty() {
                lower
            } else {
                upper
            }
        }

        QueryFlags {
            from: self.from.or(lower.from),
            to: self.to.or(lower.to),
            subject: self.subject.or(lower.subject),
            days: self.days.or(lower.days),
            range: self.range.or(lower.range),
            unread: self.unread.or(lower.unread),
            min_size: self.min_size.or(lower.min_size),
            max_size: self.max_size.or(lower.max_size),
            has_attachments: self.has_attachments.or(lower.has_attachments),
            folder: self.folder.or(lower.folder),
            domains: list(self.domains, lower.domains),
            exclude_domains: list(self.exclude_domains, lower.exclude_domains),
            keywords: list(self.keywords, lower.keywords),
            exclude_words: list(self.exclude_words, lower.exclude_words),
            group_by: self.group_by.or(lower.group_by),
            sort_by: self.sort_by.or(lower.sort_by),
            top_n: self.top_n.or(lower.top_n),
            format: self.format.or(lower.format),
            fuzzy_threshold: self.fuzzy_threshold.or(lower.fuzzy_threshold),
            no_fuzzy: self.no_fuzzy.or(lower.no_fuzzy),
            case_sensitive: self.case_sensitive.or(lower.case_sensitive),
            limit: self.limit.or(lower.limit),
            query: self.query.or(lower.query),
        }
    }
}

/// Lowest-priority defaults, normally taken from the configuration file.
#[derive(Debug, Clone)]
pub struct QueryDefaults {
    pub fuzzy: FuzzyConfig,
    pub top_n: usize,
    pub limit: usize,
    pub folder: Option<Folder>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            fuzzy: FuzzyConfig::default(),
            top_n: DEFAULT_TOP_N,
            limit: 0,
            folder: None,
        }
    }
}

/// How a single positional token is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceForm<'a> {
    KeyValue { key: &'a str, value: &'a str },
    FreeText(&'a str),
}

type Recognizer = for<'a> fn(&'a str) -> Option<SurfaceForm<'a>>;

/// Ordered dispatch table: the first recognizer that accepts a token wins.
const SURFACE_FORMS: [(&str, Recognizer); 2] = [
    ("key=value", recognize_key_value),
    ("free text", recognize_free_text),
];

/// Classify one positional token using [`SURFACE_FORMS`].
pub fn classify(token: &str) -> SurfaceForm<'_> {
    SURFACE_FORMS
        .iter()
        .find_map(|(_, recognize)| recognize(token))
        .unwrap_or(SurfaceForm::FreeText(token))
}

fn recognize_key_value(token: &str) -> Option<SurfaceForm<'_>> {
    let (key, value) = token.split_once('=')?;
    let key_ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    key_ok.then_some(SurfaceForm::KeyValue {
        key,
        value: value.trim(),
    })
}

fn recognize_free_text(token: &str) -> Option<SurfaceForm<'_>> {
    Some(SurfaceForm::FreeText(token))
}

/// Parser bound to a reference time and optional preferences.
pub struct QueryParser<'a> {
    now: DateTime<FixedOffset>,
    defaults: QueryDefaults,
    preferences: Option<&'a dyn PreferenceResolver>,
}

impl<'a> QueryParser<'a> {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now,
            defaults: QueryDefaults::default(),
            preferences: None,
        }
    }

    pub fn with_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Supply the default "to" address when the user sets none.
    pub fn with_preferences(mut self, preferences: &'a dyn PreferenceResolver) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Parse positional `tokens` on top of caller-bound `flags`.
    ///
    /// Fails fast on the first invalid time range, size literal, option value
    /// or boolean expression.
    pub fn parse(&self, tokens: &[String], flags: &QueryFlags) -> Result<Query> {
        let mut from_tokens = QueryFlags::default();
        let mut free_text: Vec<&str> = Vec::new();
        let mut warnings = Vec::new();

        for token in tokens {
            match classify(token) {
                SurfaceForm::KeyValue { key, value } => {
                    if !apply_key_value(&mut from_tokens, key, value)? {
                        let warning = ParseWarning::UnknownKey {
                            key: key.to_string(),
                            value: value.to_string(),
                        };
                        warn!("{warning}");
                        warnings.push(warning);
                    }
                }
                SurfaceForm::FreeText(text) => free_text.push(text),
            }
        }

        let merged = flags.clone().merge_over(from_tokens);
        let mut query = self.build(merged, &free_text)?;
        query.warnings = warnings;
        debug!(query = %query.describe(), "Parsed query");
        Ok(query)
    }

    fn build(&self, flags: QueryFlags, free_text: &[&str]) -> Result<Query> {
        let time_range = match (&flags.range, flags.days) {
            (Some(range), _) => Some(time_range::resolve(range, self.now)?),
            (None, Some(days)) => Some(TimeRange::last_days(days, self.now)?),
            (None, None) => None,
        };

        let min_size = flags.min_size.as_deref().map(parse_size).transpose()?;
        let max_size = flags.max_size.as_deref().map(parse_size).transpose()?;

        let threshold = flags.fuzzy_threshold.unwrap_or(self.defaults.fuzzy.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SiftError::invalid_value(
                "fuzzy-threshold",
                threshold.to_string(),
            ));
        }
        let fuzzy = FuzzyConfig {
            enabled: !flags.no_fuzzy.unwrap_or(!self.defaults.fuzzy.enabled),
            threshold,
            case_sensitive: flags
                .case_sensitive
                .unwrap_or(self.defaults.fuzzy.case_sensitive),
        };

        let to = flags.to.or_else(|| {
            self.preferences
                .and_then(|p| p.default_to_address())
                .inspect(|addr| debug!(to = %addr, "Using preferred account as 'to' filter"))
        });

        // `--query` and positional text are separate expressions, ANDed.
        let positional = free_text.join(" ");
        let mut parts = Vec::new();
        for text in [flags.query.as_deref().unwrap_or(""), positional.as_str()] {
            if let Some(expr) = parse_free_text(text)? {
                parts.push(expr);
            }
        }
        let expr = (!parts.is_empty()).then(|| Expr::and(parts));

        let filters = FilterSet {
            from: non_empty(flags.from),
            to: non_empty(to),
            subject: non_empty(flags.subject),
            time_range,
            unread_only: flags.unread.unwrap_or(false),
            min_size,
            max_size,
            has_attachments: flags.has_attachments,
            folder: flags
                .folder
                .map(Folder::from)
                .or_else(|| self.defaults.folder.clone()),
            include_domains: lower_set(flags.domains),
            exclude_domains: lower_set(flags.exclude_domains),
            include_keywords: trimmed_set(flags.keywords),
            exclude_keywords: trimmed_set(flags.exclude_words),
            expr,
        };

        Ok(Query {
            filters,
            aggregation: AggregationSpec {
                group_by: flags.group_by.unwrap_or_default(),
                sort_by: flags.sort_by.unwrap_or_default(),
                top_n: flags.top_n.unwrap_or(self.defaults.top_n),
            },
            fuzzy,
            format: flags.format.unwrap_or_default(),
            limit: flags.limit.unwrap_or(self.defaults.limit),
            warnings: Vec::new(),
        })
    }
}

/// Apply one `key=value` token. Returns `Ok(false)` for an unknown key.
fn apply_key_value(flags: &mut QueryFlags, key: &str, value: &str) -> Result<bool> {
    let key = key.to_ascii_lowercase().replace('_', "-");
    let text = || Some(value.to_string());

    match key.as_str() {
        "from" => flags.from = text(),
        "to" => flags.to = text(),
        "subject" => flags.subject = text(),
        "days" => {
            let days = value
                .parse()
                .map_err(|_| SiftError::InvalidTimeRange(value.to_string()))?;
            flags.days = Some(days);
        }
        "range" | "time-range" | "date-range" => flags.range = text(),
        "unread" => flags.unread = Some(parse_bool(&key, value)?),
        "sent" => {
            if parse_bool(&key, value)? {
                flags.folder = Some("sent".to_string());
            }
        }
        "received" => {
            if parse_bool(&key, value)? {
                flags.folder = Some("inbox".to_string());
            }
        }
        "folder" => flags.folder = text(),
        "attachments" | "has-attachments" => {
            flags.has_attachments = Some(parse_bool(&key, value)?)
        }
        "min-size" => flags.min_size = text(),
        "max-size" => flags.max_size = text(),
        "domain" | "domains" => flags.domains.extend(split_list(value)),
        "exclude-domain" | "exclude-domains" => flags.exclude_domains.extend(split_list(value)),
        "keyword" | "keywords" => flags.keywords.extend(split_list(value)),
        "exclude" | "exclude-words" | "exclude-keywords" => {
            flags.exclude_words.extend(split_list(value))
        }
        "group-by" | "groupby" => flags.group_by = Some(value.parse()?),
        "sort-by" | "sortby" | "sort" => flags.sort_by = Some(value.parse()?),
        "top" | "top-n" => flags.top_n = Some(parse_number(&key, value)?),
        "limit" | "n" => flags.limit = Some(parse_number(&key, value)?),
        "format" => flags.format = Some(value.parse()?),
        "fuzzy-threshold" => {
            let t: f64 = value
                .parse()
                .map_err(|_| SiftError::invalid_value(&key, value))?;
            flags.fuzzy_threshold = Some(t);
        }
        "fuzzy" => flags.no_fuzzy = Some(!parse_bool(&key, value)?),
        "no-fuzzy" => flags.no_fuzzy = Some(parse_bool(&key, value)?),
        "case-sensitive" => flags.case_sensitive = Some(parse_bool(&key, value)?),
        "query" | "q" => flags.query = text(),
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" | "" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(SiftError::invalid_value(key, value)),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| SiftError::invalid_value(key, value))
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn lower_set(items: Vec<String>) -> BTreeSet<String> {
    items
        .iter()
        .flat_map(|s| split_list(s))
        .map(|s| s.trim_start_matches('@').to_ascii_lowercase())
        .collect()
}

fn trimmed_set(items: Vec<String>) -> BTreeSet<String> {
    items.iter().flat_map(|s| split_list(s)).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Free text ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word {
        text: String,
        quoted: bool,
        /// `false` when the token opened with a quote, so `"re: x"` is not a field prefix.
        prefix_allowed: bool,
    },
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Parse a free-text query into a combinator tree. Empty input yields `None`.
pub fn parse_free_text(input: &str) -> Result<Option<Expr>> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    if !has_structure(&tokens) {
        let (text, quoted) = plain_text(&tokens);
        return Ok(Some(Expr::Atom(Atom {
            field: Field::Text,
            text,
            exact: quoted,
        })));
    }

    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source: input,
    };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        let what = if *tok == Token::Close {
            "unbalanced ')'".to_string()
        } else {
            format!("unexpected {}", describe(tok))
        };
        return Err(parser.error(what));
    }
    Ok(Some(expr))
}

fn has_structure(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| match t {
        Token::Word {
            text,
            prefix_allowed,
            ..
        } => *prefix_allowed && split_field(text).is_some(),
        _ => true,
    })
}

/// A structure-free token list rejoined as one keyword.
fn plain_text(tokens: &[Token]) -> (String, bool) {
    let mut words = Vec::new();
    let mut all_quoted = true;
    for tok in tokens {
        if let Token::Word { text, quoted, .. } = tok {
            words.push(text.as_str());
            all_quoted &= *quoted;
        }
    }
    (words.join(" "), all_quoted && tokens.len() == 1)
}

fn split_field(word: &str) -> Option<(Field, &str)> {
    let (prefix, rest) = word.split_once(':')?;
    Field::from_prefix(prefix).map(|field| (field, rest))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut quoted = false;
    let mut starts_quoted = false;

    fn flush(
        tokens: &mut Vec<Token>,
        current: &mut String,
        quoted: &mut bool,
        starts_quoted: &mut bool,
    ) {
        if current.is_empty() && !*quoted {
            return;
        }
        let word = std::mem::take(current);
        if !*quoted {
            match word.to_ascii_uppercase().as_str() {
                "AND" => tokens.push(Token::And),
                "OR" => tokens.push(Token::Or),
                "NOT" => tokens.push(Token::Not),
                _ if word.len() > 1 && word.starts_with('-') => {
                    tokens.push(Token::Not);
                    tokens.push(Token::Word {
                        text: word[1..].to_string(),
                        quoted: false,
                        prefix_allowed: true,
                    });
                }
                _ => tokens.push(Token::Word {
                    text: word,
                    quoted: false,
                    prefix_allowed: true,
                }),
            }
        } else {
            tokens.push(Token::Word {
                text: word,
                quoted: true,
                prefix_allowed: !*starts_quoted,
            });
        }
        *quoted = false;
        *starts_quoted = false;
    }

    let chars: Vec<char> = input.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        match quote {
            Some('\'') if ch == '\'' && !ends_word(chars.get(i + 1)) => current.push(ch),
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                // An apostrophe only quotes at the start of a word or value, and
                // only when a closing one follows: `don't`, `o'brien` stay words.
                '\'' if !(current.is_empty() || current.ends_with(':'))
                    || quoted
                    || !closes_single_quote(&chars[i + 1..]) =>
                {
                    current.push(ch)
                }
                '"' | '\'' => {
                    if current.is_empty() && !quoted {
                        starts_quoted = true;
                    }
                    quote = Some(ch);
                    quoted = true;
                }
                '(' | ')' => {
                    flush(&mut tokens, &mut current, &mut quoted, &mut starts_quoted);
                    tokens.push(if ch == '(' { Token::Open } else { Token::Close });
                }
                c if c.is_whitespace() => {
                    flush(&mut tokens, &mut current, &mut quoted, &mut starts_quoted)
                }
                c => current.push(c),
            },
        }
    }

    if quote.is_some() {
        return Err(SiftError::InvalidBooleanQuery {
            query: input.to_string(),
            reason: "unterminated quote".to_string(),
        });
    }
    flush(&mut tokens, &mut current, &mut quoted, &mut starts_quoted);
    Ok(tokens)
}

fn ends_word(next: Option<&char>) -> bool {
    next.is_none_or(|c| c.is_whitespace() || *c == ')')
}

fn closes_single_quote(rest: &[char]) -> bool {
    rest.iter()
        .enumerate()
        .any(|(i, &c)| c == '\'' && ends_word(rest.get(i + 1)))
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Word { text, .. } => format!("'{text}'"),
        Token::And => "'AND'".to_string(),
        Token::Or => "'OR'".to_string(),
        Token::Not => "'NOT'".to_string(),
        Token::Open => "'('".to_string(),
        Token::Close => "')'".to_string(),
    }
}

struct ExprParser<'s> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'s str,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, reason: impl Into<String>) -> SiftError {
        SiftError::InvalidBooleanQuery {
            query: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(Expr::or(children))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut children = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    children.push(self.parse_unary()?);
                }
                Some(Token::Word { .. } | Token::Not | Token::Open) => {
                    children.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        Ok(Expr::and(children))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            if self.peek().is_none() {
                return Err(self.error("'NOT' without an operand"));
            }
            return Ok(Expr::not(self.parse_unary()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::Word {
                text,
                quoted,
                prefix_allowed,
            }) => self.atom(text, quoted, prefix_allowed),
            Some(Token::Close) => Err(self.error("unbalanced ')'")),
            Some(op @ (Token::And | Token::Or)) => {
                Err(self.error(format!("{} without a left operand", describe(&op))))
            }
            Some(Token::Not) => Err(self.error("misplaced 'NOT'")),
            None => Err(self.error("expression ends with an operator")),
        }
    }

    fn atom(&mut self, text: String, quoted: bool, prefix_allowed: bool) -> Result<Expr> {
        let Some((field, value)) = split_field(&text).filter(|_| prefix_allowed) else {
            return Ok(Expr::Atom(Atom {
                field: Field::Text,
                text,
                exact: quoted,
            }));
        };

        // `subject: budget` binds the prefix to the following word.
        let (value, quoted) = if value.trim().is_empty() {
            match self.tokens.get(self.pos) {
                Some(Token::Word { text, quoted, .. }) => {
                    let next = (text.clone(), *quoted);
                    self.pos += 1;
                    next
                }
                _ => return Err(self.error(format!("missing value after '{}:'", field.prefix()))),
            }
        } else {
            (value.to_string(), quoted)
        };

        if field == Field::Text {
            let alternatives: Vec<Expr> = value
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| {
                    Expr::Atom(Atom {
                        field,
                        text: k.to_string(),
                        exact: quoted,
                    })
                })
                .collect();
            if alternatives.is_empty() {
                return Err(self.error(format!("missing value after '{}:'", field.prefix())));
            }
            return Ok(Expr::or(alternatives));
        }

        Ok(Expr::Atom(Atom {
            field,
            text: value,
            exact: quoted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-15T10:00:00+00:00").unwrap()
    }

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn parse(items: &[&str]) -> Result<Query> {
        QueryParser::new(now()).parse(&tokens(items), &QueryFlags::default())
    }

    fn text(t: &str) -> Expr {
        Expr::Atom(Atom::fuzzy(Field::Text, t))
    }

    #[test]
    fn test_classify_dispatch() {
        assert_eq!(
            classify("from=john@x.com"),
            SurfaceForm::KeyValue {
                key: "from",
                value: "john@x.com"
            }
        );
        assert_eq!(classify("hello"), SurfaceForm::FreeText("hello"));
        assert_eq!(classify("a b=c"), SurfaceForm::FreeText("a b=c"));
        assert_eq!(classify("=x"), SurfaceForm::FreeText("=x"));
    }

    #[test]
    fn test_defaults_applied() {
        let q = parse(&[]).unwrap();
        assert_eq!(q.aggregation.top_n, 10);
        assert!((q.fuzzy.threshold - 0.7).abs() < f64::EPSILON);
        assert!(q.filters.is_empty());
        assert!(q.warnings.is_empty());
    }

    #[test]
    fn test_key_value_tokens() {
        let q = parse(&[
            "from=john@x.com",
            "min-size=5MB",
            "group-by=sender",
            "top-n=3",
            "domains=gmail.com, @Example.org",
            "exclude-words=spam,ads",
            "unread=yes",
            "format=json",
        ])
        .unwrap();
        assert_eq!(q.filters.from.as_deref(), Some("john@x.com"));
        assert_eq!(q.filters.min_size, Some(5 * 1024 * 1024));
        assert_eq!(q.aggregation.group_by, GroupBy::Sender);
        assert_eq!(q.aggregation.top_n, 3);
        assert!(q.filters.include_domains.contains("gmail.com"));
        assert!(q.filters.include_domains.contains("example.org"));
        assert_eq!(q.filters.exclude_keywords.len(), 2);
        assert!(q.filters.unread_only);
        assert_eq!(q.format, OutputFormat::Json);
    }

    #[test]
    fn test_flags_win_over_tokens() {
        let flags = QueryFlags {
            from: Some("boss@corp.com".to_string()),
            top_n: Some(5),
            ..Default::default()
        };
        let q = QueryParser::new(now())
            .parse(&tokens(&["from=other@x.com", "top-n=50"]), &flags)
            .unwrap();
        assert_eq!(q.filters.from.as_deref(), Some("boss@corp.com"));
        assert_eq!(q.aggregation.top_n, 5);
    }

    #[test]
    fn test_unknown_keys_are_warnings() {
        let q = parse(&["colour=blue", "from=a@b.com"]).unwrap();
        assert_eq!(
            q.warnings,
            vec![ParseWarning::UnknownKey {
                key: "colour".to_string(),
                value: "blue".to_string()
            }]
        );
        assert_eq!(q.filters.from.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_range_beats_days() {
        let q = parse(&["days=3", "range=yesterday"]).unwrap();
        let r = q.filters.time_range.unwrap();
        assert_eq!(r.name, "yesterday");

        let flags = QueryFlags {
            days: Some(30),
            ..Default::default()
        };
        let q = QueryParser::new(now())
            .parse(&tokens(&["range=this week"]), &flags)
            .unwrap();
        assert_eq!(q.filters.time_range.unwrap().name, "this week");

        let q = parse(&["days=7"]).unwrap();
        assert_eq!(q.filters.time_range.unwrap().name, "last 7 days");
    }

    #[test]
    fn test_invalid_inputs_fail_fast() {
        assert!(matches!(
            parse(&["min-size=5XB"]),
            Err(SiftError::InvalidSizeLiteral(t)) if t == "5XB"
        ));
        assert!(matches!(
            parse(&["range=someday"]),
            Err(SiftError::InvalidTimeRange(t)) if t == "someday"
        ));
        assert!(matches!(
            parse(&["days=abc"]),
            Err(SiftError::InvalidTimeRange(_))
        ));
        assert!(matches!(
            parse(&["group-by=planet"]),
            Err(SiftError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse(&["fuzzy-threshold=1.5"]),
            Err(SiftError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_plain_free_text_is_one_fuzzy_keyword() {
        let q = parse(&["budget", "review"]).unwrap();
        assert_eq!(q.filters.expr, Some(text("budget review")));
    }

    #[test]
    fn test_boolean_precedence() {
        let q = parse(&["urgent OR important AND NOT spam"]).unwrap();
        let expected = Expr::Or(vec![
            text("urgent"),
            Expr::And(vec![text("important"), Expr::not(text("spam"))]),
        ]);
        assert_eq!(q.filters.expr, Some(expected));
    }

    #[test]
    fn test_operators_case_insensitive_and_implicit_and() {
        let e = parse_free_text("from:alice subject:budget or -newsletter")
            .unwrap()
            .unwrap();
        let expected = Expr::Or(vec![
            Expr::And(vec![
                Expr::Atom(Atom::fuzzy(Field::From, "alice")),
                Expr::Atom(Atom::fuzzy(Field::Subject, "budget")),
            ]),
            Expr::not(text("newsletter")),
        ]);
        assert_eq!(e, expected);
    }

    #[test]
    fn test_parentheses_and_quotes() {
        let e = parse_free_text("(alice OR bob) AND subject:\"team lunch\"")
            .unwrap()
            .unwrap();
        let expected = Expr::And(vec![
            Expr::Or(vec![text("alice"), text("bob")]),
            Expr::Atom(Atom {
                field: Field::Subject,
                text: "team lunch".to_string(),
                exact: true,
            }),
        ]);
        assert_eq!(e, expected);
    }

    #[test]
    fn test_keywords_prefix_is_alternation() {
        let e = parse_free_text("keywords:invoice,receipt").unwrap().unwrap();
        assert_eq!(e, Expr::Or(vec![text("invoice"), text("receipt")]));
    }

    #[test]
    fn test_quoted_prefix_is_plain_text() {
        let e = parse_free_text("\"re: hello\"").unwrap().unwrap();
        assert_eq!(
            e,
            Expr::Atom(Atom {
                field: Field::Text,
                text: "re: hello".to_string(),
                exact: true
            })
        );
    }

    #[test]
    fn test_malformed_boolean_queries() {
        for bad in [
            "spam AND",
            "NOT",
            "urgent NOT",
            "OR urgent",
            "(urgent",
            "urgent)",
            "a AND OR b",
            "from:",
            "\"unterminated",
        ] {
            assert!(
                matches!(
                    parse_free_text(bad),
                    Err(SiftError::InvalidBooleanQuery { .. })
                ),
                "expected InvalidBooleanQuery for {bad:?}"
            );
        }
    }

    #[test]
    fn test_query_flag_combined_with_positional() {
        let flags = QueryFlags {
            query: Some("a OR b".to_string()),
            ..Default::default()
        };
        let q = QueryParser::new(now())
            .parse(&tokens(&["c"]), &flags)
            .unwrap();
        assert_eq!(
            q.filters.expr,
            Some(Expr::And(vec![Expr::Or(vec![text("a"), text("b")]), text("c")]))
        );

        // A plain phrase stays one keyword next to positional text.
        let flags = QueryFlags {
            query: Some("team lunch".to_string()),
            ..Default::default()
        };
        let q = QueryParser::new(now())
            .parse(&tokens(&["friday"]), &flags)
            .unwrap();
        assert_eq!(
            q.filters.expr,
            Some(Expr::And(vec![text("team lunch"), text("friday")]))
        );
    }

    #[test]
    fn test_apostrophes_inside_words() {
        let e = parse_free_text("don't forget").unwrap().unwrap();
        assert_eq!(e, text("don't forget"));

        let e = parse_free_text("O'Brien invoice").unwrap().unwrap();
        assert_eq!(e, text("O'Brien invoice"));

        let e = parse_free_text("from:o'brien").unwrap().unwrap();
        assert_eq!(e, Expr::Atom(Atom::fuzzy(Field::From, "o'brien")));

        let e = parse_free_text("'tis the season").unwrap().unwrap();
        assert_eq!(e, text("'tis the season"));

        let q = parse(&["don't", "forget"]).unwrap();
        assert_eq!(q.filters.expr, Some(text("don't forget")));
    }

    #[test]
    fn test_single_quotes_still_group_phrases() {
        let e = parse_free_text("'weekly report' OR subject:'q3 plan'")
            .unwrap()
            .unwrap();
        let expected = Expr::Or(vec![
            Expr::Atom(Atom {
                field: Field::Text,
                text: "weekly report".to_string(),
                exact: true,
            }),
            Expr::Atom(Atom {
                field: Field::Subject,
                text: "q3 plan".to_string(),
                exact: true,
            }),
        ]);
        assert_eq!(e, expected);

        let e = parse_free_text("'it's done'").unwrap().unwrap();
        assert_eq!(
            e,
            Expr::Atom(Atom {
                field: Field::Text,
                text: "it's done".to_string(),
                exact: true,
            })
        );
    }

    #[test]
    fn test_spaced_field_prefix_takes_next_word() {
        let e = parse_free_text("subject: budget").unwrap().unwrap();
        assert_eq!(e, Expr::Atom(Atom::fuzzy(Field::Subject, "budget")));

        let e = parse_free_text("from: alice OR subject: budget").unwrap().unwrap();
        assert_eq!(
            e,
            Expr::Or(vec![
                Expr::Atom(Atom::fuzzy(Field::From, "alice")),
                Expr::Atom(Atom::fuzzy(Field::Subject, "budget")),
            ])
        );

        let e = parse_free_text("subject: \"team lunch\" friday").unwrap().unwrap();
        assert_eq!(
            e,
            Expr::And(vec![
                Expr::Atom(Atom {
                    field: Field::Subject,
                    text: "team lunch".to_string(),
                    exact: true,
                }),
                text("friday"),
            ])
        );

        for bad in ["subject:", "from: OR bob", "to: (x)"] {
            assert!(
                matches!(
                    parse_free_text(bad),
                    Err(SiftError::InvalidBooleanQuery { .. })
                ),
                "expected InvalidBooleanQuery for {bad:?}"
            );
        }
    }

    #[test]
    fn test_natural_language_punctuation() {
        let e = parse_free_text("re: lunch, friday?").unwrap().unwrap();
        assert_eq!(e, text("re: lunch, friday?"));

        let e = parse_free_text("can't make it - sorry!").unwrap().unwrap();
        assert_eq!(e, text("can't make it - sorry!"));
    }

    #[test]
    fn test_fuzzy_toggles() {
        let q = parse(&["no-fuzzy=true", "case-sensitive=1", "fuzzy-threshold=0.9"]).unwrap();
        assert!(!q.fuzzy.enabled);
        assert!(q.fuzzy.case_sensitive);
        assert!((q.fuzzy.threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_folder_shortcuts() {
        let q = parse(&["sent=true"]).unwrap();
        assert_eq!(q.filters.folder, Some(Folder::Sent));
        let q = parse(&["has-attachments=false"]).unwrap();
        assert_eq!(q.filters.has_attachments, Some(false));
    }

    struct FixedPrefs;

    impl PreferenceResolver for FixedPrefs {
        fn default_to_address(&self) -> Option<String> {
            Some("me@home.net".to_string())
        }
    }

    #[test]
    fn test_preferences_supply_default_to() {
        let prefs = FixedPrefs;
        let parser = QueryParser::new(now()).with_preferences(&prefs);
        let q = parser.parse(&[], &QueryFlags::default()).unwrap();
        assert_eq!(q.filters.to.as_deref(), Some("me@home.net"));

        let q = parser.parse(&tokens(&["to=other@x.com"]), &QueryFlags::default()).unwrap();
        assert_eq!(q.filters.to.as_deref(), Some("other@x.com"));
    }
}
