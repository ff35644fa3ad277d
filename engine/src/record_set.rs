//! RecordSet - the authoritative in-memory collection.
//!
//! Records are keyed by [`ContentKey`], so two records can never share a
//! case-insensitive `(text, category)` pair. Ids come from an
//! [`IdAllocator`] that travels with the set and is never rewound.

use crate::{
    error::Result, merge::Conflict, normalize, ContentKey, Error, MergeOutcome, Record,
    RecordCandidate, RecordId, RemoteId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Quotes a fresh installation starts with.
pub const DEFAULT_QUOTES: [(&str, &str); 3] = [
    (
        "The best way to get started is to quit talking and begin doing.",
        "Motivation",
    ),
    (
        "Success is not in what you have, but who you are.",
        "Success",
    ),
    ("Happiness depends upon ourselves.", "Happiness"),
];

/// Hands out record ids. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdAllocator {
    next: RecordId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    /// An allocator whose next id is `next` (at least 1).
    pub fn starting_at(next: RecordId) -> Self {
        Self { next: next.max(1) }
    }

    /// Take the next id.
    pub fn allocate(&mut self) -> RecordId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> RecordId {
        self.next
    }

    /// Make sure `id` will never be handed out.
    pub fn observe(&mut self, id: RecordId) {
        self.next = self.next.max(id.saturating_add(1));
    }
}

/// Which records a presentation query wants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Category(String),
}

impl CategoryFilter {
    /// Parse a query value; missing, blank or `"all"` means every category.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("all") => Self::All,
            Some(category) => Self::Category(category.to_string()),
        }
    }

    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Category(category) => record.category.trim() == category,
        }
    }
}

/// The collection of active records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: BTreeMap<ContentKey, Record>,
    ids: IdAllocator,
}

impl RecordSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from already-normalized records.
    ///
    /// If two records share a content key the first one is kept.
    pub fn from_records(records: impl IntoIterator<Item = Record>, ids: IdAllocator) -> Self {
        let mut set = Self {
            records: BTreeMap::new(),
            ids,
        };
        for record in records {
            set.ids.observe(record.id);
            set.records.entry(record.content_key()).or_insert(record);
        }
        set
    }

    /// A set holding the [`DEFAULT_QUOTES`].
    pub fn seeded(now: Timestamp) -> Self {
        let mut ids = IdAllocator::default();
        let out = normalize::normalize(
            DEFAULT_QUOTES
                .iter()
                .map(|(text, category)| RecordCandidate::new(*text, *category)),
            &mut ids,
            now,
        );
        Self::from_records(out.records, ids)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The id allocator state.
    pub fn ids(&self) -> IdAllocator {
        self.ids
    }

    /// Look up a record by content key.
    pub fn get(&self, key: &ContentKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Whether a record with this content key exists.
    pub fn contains_key(&self, key: &ContentKey) -> bool {
        self.records.contains_key(key)
    }

    /// Look up a record by id.
    pub fn get_by_id(&self, id: RecordId) -> Option<&Record> {
        self.records.values().find(|r| r.id == id)
    }

    /// Iterate over records in content-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Records passing `filter`, oldest id first.
    pub fn active(&self, filter: &CategoryFilter) -> Vec<&Record> {
        let mut records: Vec<_> = self.records.values().filter(|r| filter.matches(r)).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Sorted distinct categories.
    pub fn categories(&self) -> Vec<String> {
        let categories: std::collections::BTreeSet<_> = self
            .records
            .values()
            .map(|r| r.category.trim().to_string())
            .collect();
        categories.into_iter().collect()
    }

    /// Local, unpublished records, oldest id first.
    pub fn pending_push(&self) -> Vec<Record> {
        let mut pending: Vec<_> = self
            .records
            .values()
            .filter(|r| r.needs_push())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        pending
    }

    /// Add a user-originated record.
    ///
    /// Fails with [`Error::Duplicate`] when the content key is taken and with
    /// [`Error::Validation`] when the input is blank. The set is untouched on
    /// failure.
    pub fn add_local(
        &mut self,
        text: &str,
        category: &str,
        now: Timestamp,
    ) -> Result<Record> {
        let mut ids = self.ids;
        let out = normalize::normalize(
            std::iter::once(RecordCandidate::new(text, category)),
            &mut ids,
            now,
        );

        if let Some(rejected) = out.rejected.into_iter().next() {
            return Err(rejected.error.into());
        }
        let Some(record) = out.records.into_iter().next() else {
            return Err(Error::Validation(crate::ValidationError::MissingText));
        };

        if self.contains_key(&record.content_key()) {
            return Err(Error::Duplicate {
                text: record.text,
                category: record.category,
            });
        }

        self.ids = ids;
        self.records.insert(record.content_key(), record.clone());
        Ok(record)
    }

    /// Record that the remote accepted the record with `id`.
    ///
    /// Returns `false` if the record no longer exists.
    pub fn mark_published(
        &mut self,
        id: RecordId,
        remote_id: impl Into<RemoteId>,
        now: Timestamp,
    ) -> bool {
        match self.records.values_mut().find(|r| r.id == id) {
            Some(record) => {
                record.mark_published(remote_id, now);
                true
            }
            None => false,
        }
    }

    /// Re-add an old version as a fresh local record.
    ///
    /// No-op (returns `None`) if its content key is already present.
    pub fn restore(&mut self, version: &Record, now: Timestamp) -> Option<Record> {
        let key = version.content_key();
        if self.contains_key(&key) {
            return None;
        }
        let record = Record::new_local(
            self.ids.allocate(),
            version.text.clone(),
            version.category.clone(),
            now,
        );
        self.records.insert(key, record.clone());
        Some(record)
    }

    /// Replace the set's contents with a merge result.
    ///
    /// `snapshot` is the state the merge was computed against. Records that
    /// were added to `self` after the snapshot are kept unless a remote
    /// record took their content key, in which case the remote wins and a
    /// conflict is returned.
    pub fn commit_merge(&mut self, snapshot: &RecordSet, outcome: MergeOutcome) -> Vec<Conflict> {
        let known: HashSet<RecordId> = snapshot.records.values().map(|r| r.id).collect();
        let mut additions: Vec<Record> = self
            .records
            .values()
            .filter(|r| !known.contains(&r.id))
            .cloned()
            .collect();
        additions.sort_by_key(|r| r.id);

        // Ids handed out by the merge may clash with ids allocated here in
        // the meantime.
        let renumber = self.ids.peek() > outcome.fresh_from;
        let mut ids = IdAllocator::starting_at(self.ids.peek().max(outcome.ids.peek()));

        let mut merged = BTreeMap::new();
        for mut record in outcome.records {
            if renumber && record.id >= outcome.fresh_from {
                record.id = ids.allocate();
            }
            merged.insert(record.content_key(), record);
        }

        let mut conflicts = Vec::new();
        for addition in additions {
            let key = addition.content_key();
            match merged.get(&key) {
                Some(winner) => {
                    if addition.diverges_from(winner) {
                        conflicts.push(Conflict {
                            local: addition,
                            remote: winner.clone(),
                            detected_at: outcome.detected_at,
                        });
                    }
                }
                None => {
                    merged.insert(key, addition);
                }
            }
        }

        self.records = merged;
        self.ids = ids;
        conflicts
    }
}
