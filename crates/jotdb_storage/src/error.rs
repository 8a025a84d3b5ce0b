//! Error types for block storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during block storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A block file contained an empty line.
    ///
    /// Empty lines are structurally illegal in a block: every record is a
    /// non-empty JSON object followed by a newline.
    #[error("empty line in block {bid} at line {line_no}")]
    EmptyLine {
        /// Block file name.
        bid: String,
        /// 1-based line number of the offending line.
        line_no: u64,
    },

    /// A block file holds bytes that are not valid record text.
    #[error("corrupt block {bid} at line {line_no}: {message}")]
    Corrupt {
        /// Block file name.
        bid: String,
        /// 1-based line number.
        line_no: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The store has been closed; no further operations are possible.
    #[error("block store is closed")]
    Closed,
}

impl StorageError {
    /// Creates a corrupt-block error.
    pub fn corrupt(bid: impl Into<String>, line_no: u64, message: impl Into<String>) -> Self {
        Self::Corrupt {
            bid: bid.into(),
            line_no,
            message: message.into(),
        }
    }
}
