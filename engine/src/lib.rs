//! # QuoteSync Engine
//!
//! The merge and conflict-resolution core behind QuoteSync.
//!
//! This crate keeps a local collection of quotes reconciled with a remote
//! authority. It decides what a fetched batch does to local state, which
//! divergences get recorded, and how recorded divergences are undone. It
//! never touches files, sockets or the wall clock.
//!
//! ## Design Principles
//!
//! - **No IO**: storage and transport belong to the host
//! - **Deterministic**: same records, same batch, same `now` => same result
//! - **Typed boundary**: anything loosely shaped goes through [`normalize`]
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a quote with a stable local id, an optional remote id, a
//! text, a category, a last-modified timestamp and an [`Origin`]. Two records
//! are "the same" for merging when their [`ContentKey`] (case-insensitive
//! text and category) matches.
//!
//! ### Record sets
//!
//! A [`RecordSet`] holds at most one record per content key and owns the
//! [`IdAllocator`] that guarantees ids are never reused.
//!
//! ### Merging
//!
//! [`merge()`] applies a remote batch with remote precedence: on a collision
//! the fetched version is kept. Divergent local versions come back as
//! [`Conflict`]s, which a [`ConflictLedger`] stores append-only.
//!
//! ## Quick Start
//!
//! ```rust
//! use quotesync_engine::{merge, ConflictLedger, RecordCandidate, RecordSet};
//!
//! let mut set = RecordSet::new();
//! set.add_local("Stay hungry", "Inspiration", 1_000).unwrap();
//!
//! let fetched = vec![RecordCandidate {
//!     updated_at: Some(500),
//!     ..RecordCandidate::new("Stay hungry", "Inspiration")
//! }];
//!
//! let snapshot = set.clone();
//! let outcome = merge(&snapshot, fetched, 2_000);
//! let mut conflicts = outcome.conflicts.clone();
//! conflicts.extend(set.commit_merge(&snapshot, outcome));
//!
//! let mut ledger = ConflictLedger::new();
//! ledger.append(conflicts);
//!
//! assert_eq!(set.len(), 1);
//! assert_eq!(ledger.len(), 1);
//! ```
//!
//! ## Persistence
//!
//! Use [`RecordSnapshot`] and [`LedgerSnapshot`] to move state in and out of
//! durable storage as JSON.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod normalize;
pub mod record;
pub mod record_set;
pub mod snapshot;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock};
pub use error::{Error, Result, ValidationError};
pub use ledger::{ConflictEntry, ConflictLedger};
pub use merge::{merge, Conflict, MergeOutcome};
pub use normalize::{
    normalize, normalize_values, Normalized, RecordCandidate, Rejected, MAX_CATEGORY_LEN,
    MAX_RECORD_ID, MAX_TEXT_LEN,
};
pub use record::{ContentKey, Origin, Record};
pub use record_set::{CategoryFilter, IdAllocator, RecordSet, DEFAULT_QUOTES};
pub use snapshot::{LedgerSnapshot, RecordSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type RecordId = u64;
pub type RemoteId = String;
pub type Timestamp = u64;
pub type Seq = u64;
