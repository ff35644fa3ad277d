//! Test doubles shared by the server's unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quotesync_engine::{ManualClock, Record, RemoteId};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::remote::{RawRecord, RemoteError, RemoteSource};
use crate::storage::memory::MemoryStore;

/// A remote whose answers are queued up front.
///
/// Fetches pop the next scripted result, or return an empty batch when the
/// script is exhausted. When gated, a fetch waits for [`release`] (or
/// cancellation) before answering.
///
/// [`release`]: ScriptedRemote::release
#[derive(Default)]
pub struct ScriptedRemote {
    fetches: Mutex<VecDeque<Result<Vec<RawRecord>, RemoteError>>>,
    failing_pushes: Mutex<HashSet<String>>,
    pushed: Mutex<Vec<Record>>,
    gate: Option<Notify>,
    pub fetch_started: Notify,
    fetch_calls: AtomicUsize,
    next_remote_id: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            next_remote_id: AtomicUsize::new(101),
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    pub fn script_fetch(&self, result: Result<Vec<RawRecord>, RemoteError>) {
        self.fetches.lock().unwrap().push_back(result);
    }

    /// Make pushes of records with this text fail.
    pub fn fail_push_of(&self, text: &str) {
        self.failing_pushes.lock().unwrap().insert(text.to_string());
    }

    /// Let a gated fetch answer.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn pushed(&self) -> Vec<Record> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch(
        &self,
        _limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>, RemoteError> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();

        if let Some(gate) = &self.gate {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                _ = gate.notified() => {}
            }
        }

        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn push(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<RemoteId, RemoteError> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        if self.failing_pushes.lock().unwrap().contains(&record.text) {
            return Err(RemoteError::Status(500));
        }
        self.pushed.lock().unwrap().push(record.clone());
        Ok(self.next_remote_id.fetch_add(1, Ordering::SeqCst).to_string())
    }
}

pub fn raw(remote_id: &str, title: &str, body: &str) -> RawRecord {
    RawRecord {
        remote_id: Some(remote_id.into()),
        title: title.into(),
        body: body.into(),
    }
}

/// An engine seeded with the default quotes over an in-memory store.
pub async fn seeded_engine() -> (Arc<Engine>, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = Engine::open(store.clone(), clock.clone()).await;
    (Arc::new(engine), store, clock)
}
