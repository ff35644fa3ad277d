//! Merge logic for reconciling local state with a remote fetch.
//!
//! The policy is remote precedence: on a content-key collision the fetched
//! record always wins, even when the local version is newer. Divergent local
//! versions are not dropped silently but reported as [`Conflict`]s.
//!
//! # Algorithm
//!
//! 1. Normalize the remote batch (first occurrence of a content key wins)
//! 2. Index local records by content key
//! 3. For each remote record, insert it or replace the local record sharing
//!    its key, keeping the local id and emitting a conflict on divergence
//! 4. Carry every unmatched local record forward unchanged
//! 5. Normalize the combined list again before returning

use crate::{
    normalize::{self, Rejected},
    ContentKey, IdAllocator, Origin, Record, RecordCandidate, RecordId, RecordSet, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A content-key collision whose two sides differed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// The local version that was overridden
    pub local: Record,
    /// The version that was kept
    pub remote: Record,
    /// When the collision was resolved
    pub detected_at: Timestamp,
}

/// Result of merging a remote batch into a record set.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged records, normalized
    pub records: Vec<Record>,
    /// Collisions where local and remote differed
    pub conflicts: Vec<Conflict>,
    /// Remote records with no local counterpart
    pub inserted: usize,
    /// Local records that changed to their remote version
    pub replaced: usize,
    /// Remote records that were re-fetches of published local records
    pub unchanged: usize,
    /// Local records no remote record touched
    pub carried: usize,
    /// Remote candidates dropped by the normalizer
    pub rejected_remote: Vec<Rejected>,
    /// Remote records that had to be truncated
    pub truncated: Vec<RecordId>,
    /// Allocator state after the merge
    pub ids: IdAllocator,
    /// First id this merge could have handed out
    pub fresh_from: RecordId,
    /// Timestamp the merge ran at
    pub detected_at: Timestamp,
}

impl MergeOutcome {
    /// Whether the merge left the local records as they were.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.replaced == 0 && self.conflicts.is_empty()
    }
}

/// Merge a remote batch into `local`.
///
/// Every remote candidate is treated as remote-origin; any local id it
/// carries is ignored. `local` is not modified: apply the outcome with
/// [`RecordSet::commit_merge`].
pub fn merge(
    local: &RecordSet,
    remote: impl IntoIterator<Item = RecordCandidate>,
    now: Timestamp,
) -> MergeOutcome {
    let mut ids = local.ids();
    let fresh_from = ids.peek();

    let remote = normalize::normalize(
        remote.into_iter().map(|candidate| RecordCandidate {
            id: None,
            origin: Some(Origin::Remote),
            ..candidate
        }),
        &mut ids,
        now,
    );

    let mut index: HashMap<ContentKey, &Record> =
        local.iter().map(|r| (r.content_key(), r)).collect();

    let mut candidates = Vec::with_capacity(local.len() + remote.records.len());
    let mut conflicts = Vec::new();
    let (mut inserted, mut replaced, mut unchanged) = (0, 0, 0);

    for incoming in remote.records {
        let key = incoming.content_key();
        match index.remove(&key) {
            None => {
                inserted += 1;
                candidates.push(incoming);
            }
            Some(existing) if existing.is_refetch_of(&incoming) => {
                unchanged += 1;
                candidates.push(existing.clone());
            }
            Some(existing) => {
                let winner = Record {
                    id: existing.id,
                    ..incoming
                };
                if existing.diverges_from(&winner) {
                    conflicts.push(Conflict {
                        local: existing.clone(),
                        remote: winner.clone(),
                        detected_at: now,
                    });
                }
                if *existing != winner {
                    replaced += 1;
                }
                candidates.push(winner);
            }
        }
    }

    let mut leftovers: Vec<&Record> = index.into_values().collect();
    leftovers.sort_by_key(|r| r.id);
    let carried = leftovers.len();
    candidates.extend(leftovers.into_iter().cloned());

    let merged = normalize::normalize(
        candidates.into_iter().map(RecordCandidate::from),
        &mut ids,
        now,
    );

    MergeOutcome {
        records: merged.records,
        conflicts,
        inserted,
        replaced,
        unchanged,
        carried,
        rejected_remote: remote.rejected,
        truncated: remote.truncated,
        ids,
        fresh_from,
        detected_at: now,
    }
}
