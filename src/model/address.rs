//! Email address parsing (RFC 5322 §3.4) and domain extraction.

use serde::{Deserialize, Deserializer, Serialize};

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
///
/// Deserializes either from a header-style string or from an object with
/// `display_name` / `address` fields, so record files can use whichever is handy.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, Hash)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Build an address with no display name.
    pub fn bare(address: impl Into<String>) -> Self {
        Self {
            display_name: String::new(),
            address: address.into(),
        }
    }

    /// Parse a single email address from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// If parsing fails, the raw string is stored as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }
        Self::bare(trimmed)
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas: `"Last, First" <a@b.com>, other@c.com`
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    let addr = Self::parse(&current);
                    if !addr.address.is_empty() {
                        results.push(addr);
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }

        let addr = Self::parse(&current);
        if !addr.address.is_empty() {
            results.push(addr);
        }
        results
    }

    /// Lower-cased domain after the last `@`, or `""` when there is none.
    pub fn domain(&self) -> String {
        domain_of(&self.address)
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

/// Lower-cased domain of a bare or bracketed address (`"a@X.com>"` → `"x.com"`).
pub fn domain_of(address: &str) -> String {
    match address.rsplit_once('@') {
        Some((_, domain)) => domain
            .trim_end_matches('>')
            .trim()
            .to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Header(String),
            Fields {
                #[serde(default)]
                display_name: String,
                #[serde(default)]
                address: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Header(raw) => Self::parse(&raw),
            Repr::Fields {
                display_name,
                address,
            } => Self {
                display_name,
                address,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("User One <user1@example.com>");
        assert_eq!(addr.address, "user1@example.com");
        assert_eq!(addr.display_name, "User One");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = EmailAddress::parse_list("\"Last, First\" <a@b.com>, other@c.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Last, First");
        assert_eq!(list[1].address, "other@c.com");
    }

    #[test]
    fn test_domain() {
        assert_eq!(EmailAddress::bare("Bob@Mail.Example.COM").domain(), "mail.example.com");
        assert_eq!(EmailAddress::bare("no-at-sign").domain(), "");
        assert_eq!(domain_of("a@x.com>"), "x.com");
    }

    #[test]
    fn test_deserialize_from_string_or_object() {
        let a: EmailAddress = serde_json::from_str("\"Alice <alice@x.com>\"").unwrap();
        assert_eq!(a.display_name, "Alice");
        assert_eq!(a.address, "alice@x.com");

        let b: EmailAddress = serde_json::from_str(r#"{"address":"bob@y.com"}"#).unwrap();
        assert_eq!(b.address, "bob@y.com");
        assert_eq!(b.display_name, "");
    }

    #[test]
    fn test_display_without_name() {
        assert_eq!(EmailAddress::bare("alice@example.com").display(), "alice@example.com");
    }
}
