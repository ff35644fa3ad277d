//! Validation boundary for anything that wants to become a [`Record`].
//!
//! Storage contents, remote payloads and merge output all pass through
//! [`normalize`] before they are trusted. The normalizer:
//!
//! 1. Drops candidates without a non-blank text or category
//! 2. Trims both fields and truncates oversized ones
//! 3. Assigns ids and timestamps to candidates lacking them
//! 4. Deduplicates by content key, keeping the first occurrence
//!
//! It is a pure function of its input, the id allocator and `now`.

use crate::{
    error::ValidationError, ContentKey, IdAllocator, Origin, Record, RecordId, RemoteId,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum length of a quote text, in characters.
pub const MAX_TEXT_LEN: usize = 500;

/// Maximum length of a category, in characters.
pub const MAX_CATEGORY_LEN: usize = 100;

/// Largest record id accepted from storage or callers (2^53 - 1, the
/// largest integer every JSON reader keeps exact).
pub const MAX_RECORD_ID: RecordId = (1 << 53) - 1;

/// A loosely-typed record as found in storage or produced by a collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordCandidate {
    pub id: Option<RecordId>,
    pub remote_id: Option<RemoteId>,
    pub text: Option<String>,
    pub category: Option<String>,
    pub updated_at: Option<Timestamp>,
    pub origin: Option<Origin>,
}

impl RecordCandidate {
    /// A bare candidate with only text and category.
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            category: Some(category.into()),
            ..Self::default()
        }
    }

    /// Interpret an arbitrary JSON value as a candidate.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

impl From<Record> for RecordCandidate {
    fn from(record: Record) -> Self {
        Self {
            id: Some(record.id),
            remote_id: record.remote_id,
            text: Some(record.text),
            category: Some(record.category),
            updated_at: Some(record.updated_at),
            origin: Some(record.origin),
        }
    }
}

/// A candidate that did not make it through normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Position in the input sequence
    pub index: usize,
    /// Why it was dropped
    pub error: ValidationError,
}

/// Outcome of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Accepted records, in input order
    pub records: Vec<Record>,
    /// Candidates dropped for shape problems
    pub rejected: Vec<Rejected>,
    /// Ids of accepted records whose text or category was cut short
    pub truncated: Vec<RecordId>,
    /// Number of candidates dropped as content-key duplicates
    pub duplicates: usize,
}

/// Normalize well-formed candidates.
pub fn normalize(
    candidates: impl IntoIterator<Item = RecordCandidate>,
    ids: &mut IdAllocator,
    now: Timestamp,
) -> Normalized {
    normalize_results(candidates.into_iter().map(Ok), ids, now)
}

/// Normalize raw JSON values, rejecting the ones that are not record-shaped.
pub fn normalize_values(
    values: impl IntoIterator<Item = serde_json::Value>,
    ids: &mut IdAllocator,
    now: Timestamp,
) -> Normalized {
    normalize_results(
        values.into_iter().map(RecordCandidate::from_value),
        ids,
        now,
    )
}

fn normalize_results(
    candidates: impl Iterator<Item = Result<RecordCandidate, ValidationError>>,
    ids: &mut IdAllocator,
    now: Timestamp,
) -> Normalized {
    let candidates: Vec<_> = candidates.map(|c| c.and_then(check_id)).collect();

    // Reserve every supplied id up front so fresh ids never collide with a
    // later candidate's explicit one.
    for candidate in candidates.iter().flatten() {
        if let Some(id) = candidate.id {
            ids.observe(id);
        }
    }

    let mut out = Normalized::default();
    let mut seen_keys = HashSet::new();
    let mut seen_ids = HashSet::new();

    for (index, candidate) in candidates.into_iter().enumerate() {
        let candidate = match candidate.and_then(validate) {
            Ok(candidate) => candidate,
            Err(error) => {
                out.rejected.push(Rejected { index, error });
                continue;
            }
        };

        let (text, text_cut) = clamp(&candidate.text, MAX_TEXT_LEN);
        let (category, category_cut) = clamp(&candidate.category, MAX_CATEGORY_LEN);

        let key = ContentKey::new(&text, &category);
        if !seen_keys.insert(key) {
            out.duplicates += 1;
            continue;
        }

        let id = match candidate.id {
            Some(id) if seen_ids.insert(id) => id,
            _ => {
                let id = ids.allocate();
                seen_ids.insert(id);
                id
            }
        };

        if text_cut || category_cut {
            out.truncated.push(id);
        }

        out.records.push(Record {
            id,
            remote_id: candidate.remote_id,
            text,
            category,
            updated_at: candidate.updated_at.unwrap_or(now),
            origin: candidate.origin.unwrap_or_default(),
        });
    }

    out
}

/// A candidate whose mandatory fields are known to be present.
struct Checked {
    id: Option<RecordId>,
    remote_id: Option<RemoteId>,
    text: String,
    category: String,
    updated_at: Option<Timestamp>,
    origin: Option<Origin>,
}

fn check_id(candidate: RecordCandidate) -> Result<RecordCandidate, ValidationError> {
    match candidate.id {
        Some(id) if id > MAX_RECORD_ID => Err(ValidationError::Malformed(format!(
            "id {id} is out of range"
        ))),
        _ => Ok(candidate),
    }
}

fn validate(candidate: RecordCandidate) -> Result<Checked, ValidationError> {
    let text = candidate
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or(ValidationError::MissingText)?;
    let category = candidate
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or(ValidationError::MissingCategory)?;

    Ok(Checked {
        id: candidate.id,
        remote_id: candidate.remote_id.filter(|r| !r.is_empty()),
        text,
        category,
        updated_at: candidate.updated_at,
        origin: candidate.origin,
    })
}

/// Trim `value` and cut it to at most `max` characters.
///
/// Returns the result and whether anything beyond whitespace was removed.
fn clamp(value: &str, max: usize) -> (String, bool) {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max {
        return (trimmed.to_string(), false);
    }
    let cut: String = trimmed.chars().take(max).collect();
    (cut.trim_end().to_string(), true)
}
