//! Snapshot types for persisting and restoring engine state.
//!
//! Snapshots are the bridge between the in-memory [`RecordSet`] /
//! [`ConflictLedger`] and durable storage. Record snapshots are read
//! leniently: every stored record goes back through the normalizer, and a
//! bare JSON array of `{text, category}` objects is accepted as well.

use crate::{
    error::Result, normalize, ConflictEntry, ConflictLedger, Error, IdAllocator, Normalized,
    RecordId, RecordSet, Seq, Timestamp, MAX_RECORD_ID,
};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Persisted form of a [`RecordSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Next id the allocator hands out
    pub next_id: RecordId,
    /// Records, oldest id first. Kept as raw JSON so a damaged entry only
    /// costs that entry.
    pub records: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecords {
    Snapshot(RecordSnapshot),
    Bare(Vec<serde_json::Value>),
}

impl RecordSnapshot {
    /// Capture a record set.
    pub fn capture(set: &RecordSet) -> Result<Self> {
        let records = set
            .active(&crate::CategoryFilter::All)
            .into_iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            next_id: set.ids().peek(),
            records,
        })
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON, accepting a bare array of records.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: StoredRecords =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        let snapshot = match stored {
            StoredRecords::Snapshot(snapshot) => snapshot,
            StoredRecords::Bare(records) => Self {
                format_version: SNAPSHOT_FORMAT_VERSION,
                next_id: 1,
                records,
            },
        };

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if snapshot.next_id > MAX_RECORD_ID + 1 {
            return Err(Error::InvalidSnapshot(format!(
                "next id {} is out of range",
                snapshot.next_id
            )));
        }

        Ok(snapshot)
    }

    /// Rebuild the record set, normalizing every stored record.
    ///
    /// Also returns the normalization report so callers can log what was
    /// dropped or truncated.
    pub fn restore(self, now: Timestamp) -> (RecordSet, Normalized) {
        let mut ids = IdAllocator::starting_at(self.next_id);
        let report = normalize::normalize_values(self.records, &mut ids, now);
        let set = RecordSet::from_records(report.records.iter().cloned(), ids);
        (set, report)
    }
}

/// Persisted form of a [`ConflictLedger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Entries in detection order
    pub entries: Vec<ConflictEntry>,
}

impl LedgerSnapshot {
    /// Capture a ledger.
    pub fn capture(ledger: &ConflictLedger) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            entries: ledger.list().to_vec(),
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }

    /// Highest sequence number in the snapshot.
    pub fn last_seq(&self) -> Option<Seq> {
        self.entries.iter().map(|e| e.seq).max()
    }

    /// Rebuild the ledger.
    pub fn restore(self) -> ConflictLedger {
        ConflictLedger::from_entries(self.entries)
    }
}
