//! In-memory store for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use quotesync_engine::{LedgerSnapshot, RecordSnapshot};

use super::{LocalStore, StorageError};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Option<String>>,
    conflicts: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the records document with raw JSON.
    pub fn with_records_json(json: &str) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap() = Some(json.to_string());
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn records_json(&self) -> Option<String> {
        self.records.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load_records(&self) -> Result<RecordSnapshot, StorageError> {
        let json = self
            .records
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StorageError::NotFound("records".into()))?;
        RecordSnapshot::from_json(&json).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn save_records(&self, snapshot: &RecordSnapshot) -> Result<(), StorageError> {
        self.check_writable()?;
        let json = snapshot
            .to_json_pretty()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        *self.records.lock().unwrap() = Some(json);
        Ok(())
    }

    async fn load_conflicts(&self) -> Result<LedgerSnapshot, StorageError> {
        let json = self
            .conflicts
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StorageError::NotFound("conflicts".into()))?;
        LedgerSnapshot::from_json(&json).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn save_conflicts(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        self.check_writable()?;
        let json = snapshot
            .to_json_pretty()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        *self.conflicts.lock().unwrap() = Some(json);
        Ok(())
    }
}
