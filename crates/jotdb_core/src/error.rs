//! Error types for the jotdb engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in jotdb engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Block storage error (includes empty-line rejection on read).
    #[error("storage error: {0}")]
    Storage(#[from] jotdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine is closed; no further operations are possible.
    #[error("engine is closed")]
    Closed,

    /// The supplied record id is absent or has an inadmissible shape.
    #[error("invalid id: {message}")]
    InvalidId {
        /// Description of the problem.
        message: String,
    },

    /// A configuration option failed validation.
    #[error("invalid option: {message}")]
    InvalidOption {
        /// Description of the problem.
        message: String,
    },

    /// A block line failed to decode as a record.
    #[error("invalid record in block {bid} at line {line_no}: {cause}")]
    InvalidRecord {
        /// Block file name.
        bid: String,
        /// 1-based line number (0 when the text did not come from a file).
        line_no: u64,
        /// Description of the decode failure.
        cause: String,
    },

    /// An engine invariant was violated at runtime. This is a bug.
    #[error("internal corruption: {message}")]
    Corruption {
        /// Description of the violated invariant.
        message: String,
    },

    /// Another process holds the store directory's lock.
    #[error("store directory is locked by another process")]
    Locked,
}

impl EngineError {
    /// Creates an invalid-id error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    /// Creates an invalid-option error.
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(bid: impl Into<String>, line_no: u64, cause: impl Into<String>) -> Self {
        Self::InvalidRecord {
            bid: bid.into(),
            line_no,
            cause: cause.into(),
        }
    }

    /// Creates an internal-corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
