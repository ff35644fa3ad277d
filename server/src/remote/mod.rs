//! The remote authority the local collection is reconciled against.

mod http;

pub use http::HttpRemote;

use async_trait::async_trait;
use quotesync_engine::{Origin, Record, RecordCandidate, RemoteId, Timestamp};
use tokio_util::sync::CancellationToken;

/// A record as the remote returns it, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub remote_id: Option<RemoteId>,
    /// Title-like field; becomes the category
    pub title: String,
    /// Body-like field; becomes the text
    pub body: String,
}

impl RawRecord {
    /// Map onto a normalizer candidate, tagged remote and stamped `fetched_at`.
    pub fn into_candidate(self, fetched_at: Timestamp) -> RecordCandidate {
        RecordCandidate {
            remote_id: self.remote_id,
            updated_at: Some(fetched_at),
            origin: Some(Origin::Remote),
            ..RecordCandidate::new(self.body, self.title)
        }
    }
}

/// Remote call failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote answered with status {0}")]
    Status(u16),

    #[error("could not decode remote response: {0}")]
    Decode(String),

    #[error("cancelled")]
    Cancelled,
}

/// Fetch and push access to the remote.
///
/// Implementations must give up with [`RemoteError::Cancelled`] once `cancel`
/// fires and must not block past their own timeout.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch up to `limit` records.
    async fn fetch(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>, RemoteError>;

    /// Publish one local record, returning the id the remote assigned.
    async fn push(&self, record: &Record, cancel: &CancellationToken)
        -> Result<RemoteId, RemoteError>;
}
