//! Error types for the QuoteSync engine.

use crate::Seq;
use thiserror::Error;

/// Why a record candidate was refused by the normalizer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is missing or blank")]
    MissingText,

    #[error("category is missing or blank")]
    MissingCategory,

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// All possible errors from the QuoteSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("a quote with the same text and category already exists: {text} ({category})")]
    Duplicate { text: String, category: String },

    #[error("conflict not found: {0}")]
    ConflictNotFound(Seq),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
