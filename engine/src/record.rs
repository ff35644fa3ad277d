//! Record types for storing quotes.

use crate::{RecordId, RemoteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a record.
///
/// Provenance only: it decides which records are pushed, never who owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Created or restored locally
    #[default]
    Local,
    /// Last written by the remote authority
    Remote,
}

/// Case-insensitive `(text, category)` pair identifying a record for merge
/// and deduplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    text: String,
    category: String,
}

impl ContentKey {
    /// Build a key from raw text and category.
    pub fn new(text: &str, category: &str) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            category: category.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.category)
    }
}

/// A quote in the record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable local identity, never reused
    pub id: RecordId,
    /// Identity on the remote side; present once the record is published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    /// Quote body
    pub text: String,
    /// Category label
    pub category: String,
    /// Last modification (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Where the record was last authoritatively written
    pub origin: Origin,
}

impl Record {
    /// Create a new local, unpublished record.
    pub fn new_local(
        id: RecordId,
        text: impl Into<String>,
        category: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            remote_id: None,
            text: text.into(),
            category: category.into(),
            updated_at: timestamp,
            origin: Origin::Local,
        }
    }

    /// The record's content key.
    pub fn content_key(&self) -> ContentKey {
        ContentKey::new(&self.text, &self.category)
    }

    /// Whether the remote side knows about this record.
    pub fn is_published(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Whether the next sync round should push this record.
    pub fn needs_push(&self) -> bool {
        self.origin == Origin::Local && !self.is_published()
    }

    /// Mark the record as accepted by the remote.
    ///
    /// `updated_at` never moves backwards.
    pub fn mark_published(&mut self, remote_id: impl Into<RemoteId>, timestamp: Timestamp) {
        self.remote_id = Some(remote_id.into());
        self.origin = Origin::Remote;
        self.updated_at = self.updated_at.max(timestamp);
    }

    /// Whether two versions of a record diverge in any user-visible field.
    pub fn diverges_from(&self, other: &Record) -> bool {
        self.text != other.text
            || self.category != other.category
            || self.updated_at != other.updated_at
    }

    /// Whether `other` is a re-fetch of a record this side already took
    /// from the remote.
    ///
    /// Records with a remote id match on it. Remote records that arrived
    /// without one can only match on exact text and category.
    pub fn is_refetch_of(&self, other: &Record) -> bool {
        let same_source = match (&self.remote_id, &other.remote_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            (None, None) => self.origin == Origin::Remote && other.origin == Origin::Remote,
            _ => false,
        };
        same_source && self.text == other.text && self.category == other.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_ignores_case_and_padding() {
        let a = ContentKey::new("  Stay Hungry ", "Inspiration");
        let b = ContentKey::new("stay hungry", "INSPIRATION  ");
        assert_eq!(a, b);
        assert_ne!(a, ContentKey::new("stay hungry", "Motivation"));
    }

    #[test]
    fn new_local_record_needs_push() {
        let record = Record::new_local(1, "Stay hungry", "Inspiration", 1000);
        assert_eq!(record.origin, Origin::Local);
        assert!(!record.is_published());
        assert!(record.needs_push());
    }

    #[test]
    fn mark_published() {
        let mut record = Record::new_local(1, "Stay hungry", "Inspiration", 5000);
        record.mark_published("101", 2000);

        assert_eq!(record.remote_id.as_deref(), Some("101"));
        assert_eq!(record.origin, Origin::Remote);
        assert_eq!(record.updated_at, 5000);
        assert!(!record.needs_push());

        record.mark_published("101", 9000);
        assert_eq!(record.updated_at, 9000);
    }

    #[test]
    fn divergence_covers_timestamp() {
        let a = Record::new_local(1, "A", "C", 1000);
        let mut b = a.clone();
        assert!(!a.diverges_from(&b));

        b.updated_at = 2000;
        assert!(a.diverges_from(&b));

        let mut c = a.clone();
        c.text = "a".into();
        assert!(a.diverges_from(&c));
    }

    #[test]
    fn refetch_requires_matching_remote_id() {
        let mut local = Record::new_local(1, "A", "C", 1000);
        let mut remote = Record::new_local(9, "A", "C", 2000);
        remote.origin = Origin::Remote;
        remote.remote_id = Some("7".into());
        assert!(!local.is_refetch_of(&remote));

        local.mark_published("7", 1500);
        assert!(local.is_refetch_of(&remote));

        remote.text = "a".into();
        assert!(!local.is_refetch_of(&remote));
    }

    #[test]
    fn refetch_without_remote_id_needs_remote_origin() {
        let mut local = Record::new_local(1, "A", "C", 1000);
        let mut remote = Record::new_local(9, "A", "C", 2000);
        remote.origin = Origin::Remote;
        assert!(!local.is_refetch_of(&remote));

        local.origin = Origin::Remote;
        assert!(local.is_refetch_of(&remote));

        remote.category = "c".into();
        assert!(!local.is_refetch_of(&remote));
    }

    #[test]
    fn serialization_format() {
        let record = Record::new_local(3, "Text", "Cat", 1000);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("updatedAt"));
        assert!(json.contains(r#""origin":"local""#));
        assert!(!json.contains("remoteId"));
    }
}
