//! Local persistence for the record set and the conflict ledger.
//!
//! The engine only talks to [`LocalStore`]; where the bytes end up is the
//! implementation's business.

mod json_file;
#[cfg(test)]
pub mod memory;

pub use json_file::JsonFileStore;

use async_trait::async_trait;
use quotesync_engine::{LedgerSnapshot, RecordSnapshot};

/// Persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("nothing stored at {0}")]
    NotFound(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("failed to encode state: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable get/put of engine state.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Load the stored record set.
    async fn load_records(&self) -> Result<RecordSnapshot, StorageError>;

    /// Replace the stored record set.
    async fn save_records(&self, snapshot: &RecordSnapshot) -> Result<(), StorageError>;

    /// Load the stored conflict ledger.
    async fn load_conflicts(&self) -> Result<LedgerSnapshot, StorageError>;

    /// Replace the stored conflict ledger.
    async fn save_conflicts(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError>;
}
