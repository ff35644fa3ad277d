//! Append-only log of resolved-but-divergent records.
//!
//! Every [`Conflict`] a merge produces lands here with a sequence number
//! reflecting detection order. Entries are never edited or pruned; the only
//! way back from an entry is [`ConflictLedger::restore_local`].

use crate::{error::Result, merge::Conflict, Error, Record, RecordSet, Seq, Timestamp};
use serde::{Deserialize, Serialize};

/// A conflict as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    /// Position in detection order, starting at 1
    pub seq: Seq,
    /// The local version that lost
    pub local: Record,
    /// The remote version that was kept
    pub remote: Record,
    /// When the conflict was detected
    pub detected_at: Timestamp,
}

/// Ordered, append-only conflict log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictLedger {
    entries: Vec<ConflictEntry>,
    next_seq: Seq,
}

impl Default for ConflictLedger {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 1,
        }
    }
}

impl ConflictLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored entries.
    ///
    /// Entries are sorted by `seq`; sequence numbering continues after the
    /// highest one.
    pub fn from_entries(mut entries: Vec<ConflictEntry>) -> Self {
        entries.sort_by_key(|e| e.seq);
        let next_seq = entries.last().map_or(1, |e| e.seq + 1);
        Self { entries, next_seq }
    }

    /// Append conflicts in the order given. Returns the new entries.
    pub fn append(&mut self, conflicts: impl IntoIterator<Item = Conflict>) -> &[ConflictEntry] {
        let start = self.entries.len();
        for conflict in conflicts {
            self.entries.push(ConflictEntry {
                seq: self.next_seq,
                local: conflict.local,
                remote: conflict.remote,
                detected_at: conflict.detected_at,
            });
            self.next_seq += 1;
        }
        &self.entries[start..]
    }

    /// All entries, oldest first.
    pub fn list(&self) -> &[ConflictEntry] {
        &self.entries
    }

    /// Look up an entry.
    pub fn get(&self, seq: Seq) -> Option<&ConflictEntry> {
        self.entries
            .binary_search_by_key(&seq, |e| e.seq)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put the local side of entry `seq` back into `set`.
    ///
    /// The restored record is a fresh local record (new id, `updated_at =
    /// now`). Returns `Ok(None)` without touching `set` if a record with the
    /// same content key already exists.
    pub fn restore_local(
        &self,
        seq: Seq,
        set: &mut RecordSet,
        now: Timestamp,
    ) -> Result<Option<Record>> {
        let entry = self.get(seq).ok_or(Error::ConflictNotFound(seq))?;
        Ok(set.restore(&entry.local, now))
    }
}
