//! JSON files on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quotesync_engine::{LedgerSnapshot, RecordSnapshot};
use tokio::fs;

use super::{LocalStore, StorageError};

const RECORDS_FILE: &str = "quotes.json";
const CONFLICTS_FILE: &str = "conflicts.json";

/// Stores state as two JSON documents in a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a crash
/// mid-write leaves the previous version in place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    fn conflicts_path(&self) -> PathBuf {
        self.dir.join(CONFLICTS_FILE)
    }

    async fn read(&self, path: &Path) -> Result<String, StorageError> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, contents: String) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn load_records(&self) -> Result<RecordSnapshot, StorageError> {
        let json = self.read(&self.records_path()).await?;
        RecordSnapshot::from_json(&json).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn save_records(&self, snapshot: &RecordSnapshot) -> Result<(), StorageError> {
        let json = snapshot
            .to_json_pretty()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        self.write(&self.records_path(), json).await
    }

    async fn load_conflicts(&self) -> Result<LedgerSnapshot, StorageError> {
        let json = self.read(&self.conflicts_path()).await?;
        LedgerSnapshot::from_json(&json).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn save_conflicts(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let json = snapshot
            .to_json_pretty()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        self.write(&self.conflicts_path(), json).await
    }
}
