//! Record-level predicate evaluation.
//!
//! Complexity: O(n) records, each checked cheapest-first with short-circuit:
//! time range → unread → size → domain → attachments → folder →
//! from/to/subject → keyword include/exclude → combinator tree.
//!
//! Never fails: a missing field is an empty string and simply does not match.

use crate::fuzzy::{fuzzy_contains, FuzzyConfig};
use crate::model::record::EmailRecord;

use super::query::{Atom, Expr, Field, FilterSet, Query};

/// Return `true` if `record` satisfies every predicate of `query`.
pub fn matches(query: &Query, record: &EmailRecord) -> bool {
    let matcher = TextMatcher::new(query.fuzzy);
    filters_match(&query.filters, &matcher, record)
}

fn filters_match(f: &FilterSet, m: &TextMatcher, e: &EmailRecord) -> bool {
    // 1. Time range: the local `until` pass a source cannot apply
    if let Some(range) = &f.time_range {
        if !range.contains(&e.date) {
            return false;
        }
    }

    // 2. Unread flag
    if f.unread_only && !e.unread {
        return false;
    }

    // 3. Size bounds (inclusive)
    if f.min_size.is_some_and(|min| e.size < min) || f.max_size.is_some_and(|max| e.size > max) {
        return false;
    }

    // 4. Sender domain
    if !f.include_domains.is_empty() || !f.exclude_domains.is_empty() {
        let domain = e.sender_domain();
        if !f.include_domains.is_empty()
            && !f.include_domains.iter().any(|d| domain_matches(&domain, d))
        {
            return false;
        }
        if f.exclude_domains.iter().any(|d| domain_matches(&domain, d)) {
            return false;
        }
    }

    // 5. Attachments
    if let Some(want) = f.has_attachments {
        if e.has_attachments() != want {
            return false;
        }
    }

    // 6. Folder
    if let Some(folder) = &f.folder {
        if e.folder != *folder {
            return false;
        }
    }

    // 7. Address and subject
    if let Some(from) = &f.from {
        if !m.sender(e, from, false) {
            return false;
        }
    }
    if let Some(to) = &f.to {
        if !m.recipient(e, to, false) {
            return false;
        }
    }
    if let Some(subject) = &f.subject {
        if !m.contains(&e.subject, subject, false) {
            return false;
        }
    }

    // 8. Keywords over subject + body
    if !f.include_keywords.is_empty()
        && !f
            .include_keywords
            .iter()
            .any(|k| m.text(e, k, true))
    {
        return false;
    }
    if f.exclude_keywords.iter().any(|k| m.text(e, k, true)) {
        return false;
    }

    // 9. Combinator tree
    f.expr.as_ref().is_none_or(|expr| eval(expr, m, e))
}

/// Evaluate a combinator tree. An empty `And` is true, an empty `Or` false.
fn eval(expr: &Expr, m: &TextMatcher, e: &EmailRecord) -> bool {
    match expr {
        Expr::Atom(atom) => atom_matches(atom, m, e),
        Expr::And(children) => children.iter().all(|c| eval(c, m, e)),
        Expr::Or(children) => children.iter().any(|c| eval(c, m, e)),
        Expr::Not(inner) => !eval(inner, m, e),
    }
}

fn atom_matches(atom: &Atom, m: &TextMatcher, e: &EmailRecord) -> bool {
    let exact = atom.exact;
    match atom.field {
        Field::Text => m.text(e, &atom.text, exact),
        Field::From => m.sender(e, &atom.text, exact),
        Field::To => m.recipient(e, &atom.text, exact),
        Field::Subject => m.contains(&e.subject, &atom.text, exact),
        Field::Body => m.body(e, &atom.text, exact),
    }
}

/// Suffix match on whole dot-segments: `gmail.com` matches `mail.gmail.com`
/// but not `notgmail.com`.
pub fn domain_matches(candidate: &str, domain: &str) -> bool {
    let candidate = candidate.to_ascii_lowercase();
    let domain = domain.trim_start_matches('@').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    candidate == domain
        || candidate
            .strip_suffix(&domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Text comparison honouring the query's fuzzy switches.
struct TextMatcher {
    fuzzy: FuzzyConfig,
}

impl TextMatcher {
    fn new(fuzzy: FuzzyConfig) -> Self {
        Self { fuzzy }
    }

    /// Substring match, widened to fuzzy matching unless `exact` or fuzzy is off.
    fn contains(&self, haystack: &str, needle: &str, exact: bool) -> bool {
        if self.fuzzy.case_sensitive {
            return haystack.contains(needle);
        }
        if haystack.to_lowercase().contains(&needle.to_lowercase()) {
            return true;
        }
        !exact && self.fuzzy.is_active() && fuzzy_contains(haystack, needle, self.fuzzy.threshold)
    }

    fn sender(&self, e: &EmailRecord, needle: &str, exact: bool) -> bool {
        self.contains(&e.from.address, needle, exact)
            || (!e.from.display_name.is_empty()
                && self.contains(&e.from.display_name, needle, exact))
    }

    fn recipient(&self, e: &EmailRecord, needle: &str, exact: bool) -> bool {
        e.recipients().any(|a| {
            self.contains(&a.address, needle, exact)
                || (!a.display_name.is_empty() && self.contains(&a.display_name, needle, exact))
        })
    }

    fn body(&self, e: &EmailRecord, needle: &str, exact: bool) -> bool {
        self.contains(&e.body, needle, exact)
    }

    fn text(&self, e: &EmailRecord, needle: &str, exact: bool) -> bool {
        self.contains(&e.subject, needle, exact) || self.body(e, needle, exact)
    }
}
