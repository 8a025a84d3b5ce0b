//! Store directory management.
//!
//! File system layout of a store directory:
//!
//! ```text
//! <dir>/
//! ├─ LOCK                # advisory lock for single-process access
//! ├─ <token>.block       # live block: newline-delimited JSON records
//! ├─ <token>.block.old   # compaction residue; ignored on reopen
//! └─ <token>.tmp         # in-flight compaction artifact; ignored on reopen
//! ```
//!
//! Only files ending in the reserved block extension are scanned on open;
//! `.old` and `.tmp` residue is harmless and may be pruned externally.

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Holds the store directory and its exclusive lock.
///
/// Only one `StoreDir` instance can exist per directory at a time; a second
/// open fails with [`EngineError::Locked`]. The lock is released when the
/// value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, creating it if missing, and acquires its
    /// exclusive lock.
    pub fn open(path: &Path) -> EngineResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(EngineError::invalid_option("dir_path must be non-empty"));
        }

        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_option(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
