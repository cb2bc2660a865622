//! The email record consumed by the query engine.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;

/// One fetched email, read-only for the duration of a query.
///
/// Records come from a [`crate::source::RecordSource`]. Every field except
/// `id` and `date` defaults when missing, so a malformed record simply fails
/// predicates instead of aborting the scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Positive identifier, stable for one session.
    pub id: u64,

    /// Sender (first `From:` address).
    #[serde(default)]
    pub from: EmailAddress,

    /// Primary recipients (`To:`).
    #[serde(default)]
    pub to: Vec<EmailAddress>,

    /// Carbon-copy recipients (`Cc:`).
    #[serde(default)]
    pub cc: Vec<EmailAddress>,

    /// Blind-copy recipients, only known for sent mail.
    #[serde(default)]
    pub bcc: Vec<EmailAddress>,

    /// Decoded subject line.
    #[serde(default)]
    pub subject: String,

    /// Timestamp with the sender's UTC offset. Hour and weekday statistics
    /// are computed in this offset.
    pub date: DateTime<FixedOffset>,

    /// Plain-text body.
    #[serde(default)]
    pub body: String,

    /// HTML body, if the message had one.
    #[serde(default)]
    pub html: Option<String>,

    /// Attachment file names.
    #[serde(default)]
    pub attachments: Vec<String>,

    /// Total message size in bytes.
    #[serde(default)]
    pub size: u64,

    /// `true` while the message has not been read.
    #[serde(default)]
    pub unread: bool,

    /// Folder label.
    #[serde(default)]
    pub folder: Folder,

    /// Raw `List-Unsubscribe` header value, if any.
    #[serde(default)]
    pub list_unsubscribe: Option<String>,
}

impl EmailRecord {
    /// Minimal record used by builders and tests.
    pub fn new(id: u64, from: &str, subject: &str, date: DateTime<FixedOffset>) -> Self {
        Self {
            id,
            from: EmailAddress::parse(from),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.to_string(),
            date,
            body: String::new(),
            html: None,
            attachments: Vec::new(),
            size: 0,
            unread: false,
            folder: Folder::Inbox,
            list_unsubscribe: None,
        }
    }

    /// All recipients: to, then cc, then bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Lower-cased sender domain (`""` if the sender is missing).
    pub fn sender_domain(&self) -> String {
        self.from.domain()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Folder a record was fetched from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Folder {
    #[default]
    Inbox,
    Sent,
    Drafts,
    /// Any other mailbox, keeping its original label.
    Other(String),
}

impl Folder {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Folder {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "inbox" | "" => Self::Inbox,
            "sent" | "sent mail" | "sent items" => Self::Sent,
            "drafts" | "draft" => Self::Drafts,
            _ => Self::Other(label),
        }
    }
}

impl From<&str> for Folder {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<Folder> for String {
    fn from(folder: Folder) -> Self {
        folder.as_str().to_string()
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_missing_fields() {
        let json = r#"{"id": 7, "date": "2024-03-15T10:00:00+01:00"}"#;
        let rec: EmailRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, 7);
        assert_eq!(rec.from.address, "");
        assert_eq!(rec.folder, Folder::Inbox);
        assert!(!rec.has_attachments());
        assert_eq!(rec.sender_domain(), "");
    }

    #[test]
    fn test_folder_labels() {
        assert_eq!(Folder::from("Sent"), Folder::Sent);
        assert_eq!(Folder::from("DRAFTS"), Folder::Drafts);
        assert_eq!(Folder::from("Archive"), Folder::Other("Archive".to_string()));
        assert_eq!(String::from(Folder::Sent), "sent");
    }

    #[test]
    fn test_recipients_chain() {
        let date = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let mut rec = EmailRecord::new(1, "a@x.com", "hi", date);
        rec.to.push(EmailAddress::bare("b@x.com"));
        rec.cc.push(EmailAddress::bare("c@x.com"));
        let all: Vec<&str> = rec.recipients().map(|a| a.address.as_str()).collect();
        assert_eq!(all, vec!["b@x.com", "c@x.com"]);
    }
}
