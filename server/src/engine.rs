//! The live quote collection.
//!
//! [`Engine`] owns the record set and the conflict ledger, persists them after
//! every mutation, and publishes a [`StateSummary`] to subscribers whenever
//! something changed. All mutations go through one async mutex, so a local
//! addition never interleaves with the commit of a sync round.

use std::sync::Arc;

use quotesync_engine::{
    merge, CategoryFilter, Clock, ConflictEntry, ConflictLedger, LedgerSnapshot, Normalized,
    Record, RecordId, RecordSet, RecordSnapshot, RemoteId, Seq, Timestamp,
};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::remote::RawRecord;
use crate::scheduler::SyncReport;
use crate::storage::{LocalStore, StorageError};

/// What subscribers are told after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    /// Bumped on every change
    pub revision: u64,
    /// Number of records in the set
    pub records: usize,
    /// Number of ledger entries
    pub conflicts: usize,
    /// Whether a sync round is in flight
    pub syncing: bool,
    /// Result of the most recent round
    pub last_sync: Option<SyncReport>,
}

/// Counts from applying one fetched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub conflicts: usize,
}

struct EngineState {
    records: RecordSet,
    ledger: ConflictLedger,
    syncing: bool,
    last_sync: Option<SyncReport>,
    revision: u64,
}

impl EngineState {
    fn summary(&self) -> StateSummary {
        StateSummary {
            revision: self.revision,
            records: self.records.len(),
            conflicts: self.ledger.len(),
            syncing: self.syncing,
            last_sync: self.last_sync.clone(),
        }
    }
}

pub struct Engine {
    state: Mutex<EngineState>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    changes: watch::Sender<StateSummary>,
}

impl Engine {
    /// Load state from `store`, seeding the default quotes if nothing usable
    /// is stored.
    pub async fn open(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();

        let (records, seeded) = match store.load_records().await {
            Ok(snapshot) => {
                let (set, report) = snapshot.restore(now);
                log_normalized("stored", &report);
                (set, false)
            }
            Err(StorageError::NotFound(_)) => {
                tracing::info!("No stored quotes, seeding defaults");
                (RecordSet::seeded(now), true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load quotes, falling back to defaults");
                (RecordSet::seeded(now), false)
            }
        };

        let ledger = match store.load_conflicts().await {
            Ok(snapshot) => snapshot.restore(),
            Err(StorageError::NotFound(_)) => ConflictLedger::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conflict ledger, starting empty");
                ConflictLedger::new()
            }
        };

        tracing::info!(
            records = records.len(),
            conflicts = ledger.len(),
            "Quote collection loaded"
        );

        let state = EngineState {
            records,
            ledger,
            syncing: false,
            last_sync: None,
            revision: 0,
        };
        let (changes, _) = watch::channel(state.summary());

        let engine = Self {
            state: Mutex::new(state),
            store,
            clock,
            changes,
        };

        if seeded {
            let state = engine.state.lock().await;
            engine.persist_records(&state).await;
        }

        engine
    }

    /// Current time according to the engine's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> watch::Receiver<StateSummary> {
        self.changes.subscribe()
    }

    pub async fn summary(&self) -> StateSummary {
        self.state.lock().await.summary()
    }

    /// Records matching `filter`, ordered by id.
    pub async fn active_records(&self, filter: &CategoryFilter) -> Vec<Record> {
        let state = self.state.lock().await;
        state.records.active(filter).into_iter().cloned().collect()
    }

    /// A uniformly random record matching `filter`.
    pub async fn random_record(&self, filter: &CategoryFilter) -> Option<Record> {
        let state = self.state.lock().await;
        let candidates = state.records.active(filter);
        candidates
            .choose(&mut rand::thread_rng())
            .map(|record| (*record).clone())
    }

    pub async fn categories(&self) -> Vec<String> {
        self.state.lock().await.records.categories()
    }

    /// Add a user-originated quote.
    pub async fn add_local_record(
        &self,
        text: &str,
        category: &str,
    ) -> quotesync_engine::Result<Record> {
        let mut state = self.state.lock().await;
        let record = state.records.add_local(text, category, self.clock.now())?;

        if record.text.len() < text.trim().len() || record.category.len() < category.trim().len()
        {
            tracing::warn!(id = record.id, "Quote truncated to fit length limits");
        }
        tracing::debug!(id = record.id, category = %record.category, "Quote added");

        self.persist_records(&state).await;
        self.notify(&mut state);
        Ok(record)
    }

    /// All conflict entries, oldest first.
    pub async fn conflicts(&self) -> Vec<ConflictEntry> {
        self.state.lock().await.ledger.list().to_vec()
    }

    /// Bring back the local side of conflict `seq`.
    ///
    /// `Ok(None)` means a record with that content already exists.
    pub async fn restore_conflict(&self, seq: Seq) -> quotesync_engine::Result<Option<Record>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let restored = state
            .ledger
            .restore_local(seq, &mut state.records, self.clock.now())?;

        if let Some(record) = &restored {
            tracing::info!(seq, id = record.id, "Restored local version from conflict");
            self.persist_records(state).await;
            self.notify(state);
        }
        Ok(restored)
    }

    /// Local records that have not been published yet.
    pub async fn pending_push(&self) -> Vec<Record> {
        self.state.lock().await.records.pending_push()
    }

    /// Record the remote ids handed out for pushed records.
    pub async fn record_published(&self, published: Vec<(RecordId, RemoteId)>) -> usize {
        if published.is_empty() {
            return 0;
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let mut marked = 0;
        for (id, remote_id) in published {
            if state.records.mark_published(id, remote_id, now) {
                marked += 1;
            } else {
                tracing::debug!(id, "Pushed record vanished before it could be marked");
            }
        }

        if marked > 0 {
            self.persist_records(&state).await;
            self.notify(&mut state);
        }
        marked
    }

    /// Merge a fetched batch into the collection.
    ///
    /// The merge is computed outside the lock against a snapshot, then
    /// committed on top of whatever was added in the meantime.
    pub async fn apply_remote(
        &self,
        batch: Vec<RawRecord>,
        fetched_at: Timestamp,
    ) -> MergeSummary {
        let snapshot = self.state.lock().await.records.clone();
        let now = self.clock.now();

        let candidates = batch.into_iter().map(|raw| raw.into_candidate(fetched_at));
        let outcome = merge(&snapshot, candidates, now);

        for rejected in &outcome.rejected_remote {
            tracing::warn!(
                index = rejected.index,
                error = %rejected.error,
                "Dropped remote record"
            );
        }
        if !outcome.truncated.is_empty() {
            tracing::warn!(
                ids = ?outcome.truncated,
                "Remote records truncated to fit length limits"
            );
        }

        let noop = outcome.is_noop();
        let inserted = outcome.inserted;
        let replaced = outcome.replaced;
        let mut conflicts = outcome.conflicts.clone();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        conflicts.extend(state.records.commit_merge(&snapshot, outcome));

        for conflict in &conflicts {
            tracing::info!(
                id = conflict.remote.id,
                local = %conflict.local.text,
                remote = %conflict.remote.text,
                "Conflict resolved in favour of remote"
            );
        }

        let appended = state.ledger.append(conflicts).len();

        if !noop || appended > 0 {
            self.persist_records(state).await;
            self.notify(state);
        }
        if appended > 0 {
            self.persist_conflicts(state).await;
        }

        MergeSummary {
            inserted,
            replaced,
            conflicts: appended,
        }
    }

    /// Mark a round as in flight.
    pub async fn begin_sync(&self) {
        let mut state = self.state.lock().await;
        state.syncing = true;
        self.notify(&mut state);
    }

    /// Store the result of a finished round and tell subscribers.
    pub async fn finish_sync(&self, report: SyncReport) {
        let mut state = self.state.lock().await;
        state.syncing = false;
        state.last_sync = Some(report);
        self.notify(&mut state);
    }

    pub async fn last_sync(&self) -> Option<SyncReport> {
        self.state.lock().await.last_sync.clone()
    }

    fn notify(&self, state: &mut EngineState) {
        state.revision += 1;
        self.changes.send_replace(state.summary());
    }

    /// Save failures are logged; in-memory state stays authoritative until
    /// the next successful save.
    async fn persist_records(&self, state: &EngineState) {
        let result = match RecordSnapshot::capture(&state.records) {
            Ok(snapshot) => self.store.save_records(&snapshot).await,
            Err(e) => Err(StorageError::Encode(e.to_string())),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to save quotes");
        }
    }

    async fn persist_conflicts(&self, state: &EngineState) {
        let snapshot = LedgerSnapshot::capture(&state.ledger);
        if let Err(e) = self.store.save_conflicts(&snapshot).await {
            tracing::warn!(error = %e, "Failed to save conflict ledger");
        }
    }
}

fn log_normalized(source: &str, report: &Normalized) {
    for rejected in &report.rejected {
        tracing::warn!(
            source,
            index = rejected.index,
            error = %rejected.error,
            "Dropped invalid quote"
        );
    }
    if !report.truncated.is_empty() {
        tracing::warn!(source, ids = ?report.truncated, "Quotes truncated to fit length limits");
    }
    if report.duplicates > 0 {
        tracing::warn!(source, duplicates = report.duplicates, "Dropped duplicate quotes");
    }
}
