//! # jotdb Storage
//!
//! Directory-scoped block storage for jotdb.
//!
//! A *block* is an append-only file of newline-terminated lines living in the
//! store directory. This crate caches write handles, appends lines, iterates
//! them back lazily, and enforces the durability policy (sync-per-write or a
//! per-block fsync throttle). It owns no interpretation of line contents;
//! the engine owns the record format.
//!
//! ## Example
//!
//! ```no_run
//! use jotdb_storage::BlockStore;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let mut store = BlockStore::open(Path::new("data"), Duration::from_millis(100));
//! store.append_to_block("ab12.block", "{\"id\":\"1\"}").unwrap();
//! store.flush().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lines;
mod store;

pub use error::{StorageError, StorageResult};
pub use lines::LineReader;
pub use store::{BlockStore, BLOCK_EXT, OLD_SUFFIX, TMP_EXT};
