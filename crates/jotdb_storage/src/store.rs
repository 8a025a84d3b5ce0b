//! Directory-scoped block store.

use crate::error::{StorageError, StorageResult};
use crate::lines::LineReader;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Extension of live block files. Only files with this suffix are scanned
/// when a store directory is reopened.
pub const BLOCK_EXT: &str = ".block";

/// Suffix appended to a block file retired by compaction.
pub const OLD_SUFFIX: &str = ".old";

/// Extension of in-flight compaction artifacts.
pub const TMP_EXT: &str = ".tmp";

/// An open write handle plus its durability bookkeeping.
struct BlockHandle {
    file: File,
    /// Bytes written through the OS since the last sync.
    dirty: bool,
    last_sync: Instant,
}

/// Append-oriented storage over the block files of one directory.
///
/// The store caches one write handle per block, opened on first use. It owns
/// no interpretation of block contents beyond "newline-terminated lines".
///
/// # Durability
///
/// With a zero `sync_delay` every append is followed by a file-data sync on
/// the same call path. With a non-zero delay, appends only mark the handle
/// dirty; [`BlockStore::sync_dirty`] (driven by the engine's flush timer)
/// syncs each dirty handle at most once per delay window, so a sustained
/// write stream still produces regular syncs.
pub struct BlockStore {
    dir: PathBuf,
    sync_delay: Duration,
    handles: HashMap<String, BlockHandle>,
    closed: bool,
}

impl BlockStore {
    /// Opens a store over an existing directory.
    #[must_use]
    pub fn open(dir: &Path, sync_delay: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            sync_delay,
            handles: HashMap::new(),
            closed: false,
        }
    }

    /// Absolute path of a block file.
    #[must_use]
    pub fn path(&self, bid: &str) -> PathBuf {
        self.dir.join(bid)
    }

    /// The directory this store operates on.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn handle_mut(&mut self, bid: &str) -> StorageResult<&mut BlockHandle> {
        match self.handles.entry(bid.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.dir.join(bid))?;
                Ok(entry.insert(BlockHandle {
                    file,
                    dirty: false,
                    last_sync: Instant::now(),
                }))
            }
        }
    }

    /// Appends `line` plus a terminating newline to a block, opening a write
    /// handle on first use.
    ///
    /// Returns once the OS has accepted the bytes. With a zero sync delay the
    /// bytes are also synced to durable storage before returning.
    pub fn append_to_block(&mut self, bid: &str, line: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let sync_now = self.sync_delay.is_zero();
        let handle = self.handle_mut(bid)?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        handle.file.write_all(&buf)?;
        if sync_now {
            handle.file.sync_data()?;
            handle.last_sync = Instant::now();
        } else {
            handle.dirty = true;
        }
        Ok(())
    }

    /// Syncs one block's buffered bytes to durable storage.
    pub fn flush_block(&mut self, bid: &str) -> StorageResult<()> {
        self.ensure_open()?;
        if let Some(handle) = self.handles.get_mut(bid) {
            sync_handle(handle)?;
        }
        Ok(())
    }

    /// Syncs every open handle.
    pub fn flush(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        for handle in self.handles.values_mut() {
            sync_handle(handle)?;
        }
        Ok(())
    }

    /// Syncs handles that are dirty and whose last sync is at least one
    /// delay window old. The throttle driver.
    pub fn sync_dirty(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        let delay = self.sync_delay;
        for handle in self.handles.values_mut() {
            if handle.dirty && handle.last_sync.elapsed() >= delay {
                sync_handle(handle)?;
            }
        }
        Ok(())
    }

    /// Opens a lazy line reader over a block file.
    pub fn read_block(&self, bid: &str) -> StorageResult<LineReader> {
        self.ensure_open()?;
        let file = File::open(self.dir.join(bid))?;
        Ok(LineReader::new(bid.to_string(), file))
    }

    /// Creates an empty block file and caches its write handle.
    pub fn create_block(&mut self, bid: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.handle_mut(bid)?;
        Ok(())
    }

    /// Drops the cached write handle for a block, if any.
    pub fn close_block(&mut self, bid: &str) {
        self.handles.remove(bid);
    }

    /// Deletes a block file, closing its handle first.
    pub fn delete_block(&mut self, bid: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.close_block(bid);
        fs::remove_file(self.dir.join(bid))?;
        Ok(())
    }

    /// Renames a block file, closing its handle first.
    pub fn rename_block(&mut self, old: &str, new: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.close_block(old);
        fs::rename(self.dir.join(old), self.dir.join(new))?;
        Ok(())
    }

    /// Size in bytes of a block file on disk.
    pub fn block_stats(&self, bid: &str) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(fs::metadata(self.dir.join(bid))?.len())
    }

    /// Names and on-disk sizes of every live block file in the directory.
    pub fn blocks_stats(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stats = Vec::new();
        for bid in self.list_blocks()? {
            let len = fs::metadata(self.dir.join(&bid))?.len();
            stats.push((bid, len));
        }
        Ok(stats)
    }

    /// Names of every live block file, sorted for deterministic iteration.
    ///
    /// Files not ending in [`BLOCK_EXT`] (`.old` residue, `.tmp` artifacts,
    /// the lock file) are ignored.
    pub fn list_blocks(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        let mut bids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(BLOCK_EXT) {
                    bids.push(name.to_string());
                }
            }
        }
        bids.sort();
        Ok(bids)
    }

    /// Flushes and closes every open handle; the store refuses further work.
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        for handle in self.handles.values_mut() {
            sync_handle(handle)?;
        }
        self.handles.clear();
        self.closed = true;
        Ok(())
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("dir", &self.dir)
            .field("open_handles", &self.handles.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Error code for a sync on a handle the OS already considers closed.
#[cfg(unix)]
const STALE_HANDLE_CODE: i32 = 9; // EBADF
#[cfg(not(unix))]
const STALE_HANDLE_CODE: i32 = 6; // ERROR_INVALID_HANDLE

fn sync_handle(handle: &mut BlockHandle) -> StorageResult<()> {
    match handle.file.sync_data() {
        Ok(()) => {
            handle.dirty = false;
            handle.last_sync = Instant::now();
            Ok(())
        }
        // A stale descriptor means the block was closed underneath a
        // scheduled sync; there is nothing left to make durable.
        Err(e) if e.raw_os_error() == Some(STALE_HANDLE_CODE) => {
            handle.dirty = false;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> BlockStore {
        BlockStore::open(dir, Duration::from_millis(50))
    }

    #[test]
    fn append_creates_file() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "{\"id\":1}").unwrap();
        assert!(tmp.path().join("a.block").exists());
        assert_eq!(store.block_stats("a.block").unwrap(), 9);
    }

    #[test]
    fn append_accumulates_lines() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "one").unwrap();
        store.append_to_block("a.block", "two").unwrap();
        store.flush().unwrap();

        let lines: Vec<_> = store
            .read_block("a.block")
            .unwrap()
            .collect::<StorageResult<Vec<_>>>()
            .unwrap();
        assert_eq!(lines, vec![("one".into(), 1), ("two".into(), 2)]);
    }

    #[test]
    fn sync_per_write_when_delay_is_zero() {
        let tmp = tempdir().unwrap();
        let mut store = BlockStore::open(tmp.path(), Duration::ZERO);

        store.append_to_block("a.block", "durable").unwrap();
        // No dirty handle remains to sync.
        store.sync_dirty().unwrap();
        assert_eq!(store.block_stats("a.block").unwrap(), 8);
    }

    #[test]
    fn throttle_skips_fresh_handles() {
        let tmp = tempdir().unwrap();
        let mut store = BlockStore::open(tmp.path(), Duration::from_secs(3600));

        store.append_to_block("a.block", "x").unwrap();
        // Inside the window: sync_dirty must be a no-op, flush must not be.
        store.sync_dirty().unwrap();
        store.flush().unwrap();
    }

    #[test]
    fn list_blocks_ignores_residue() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("b.block", "x").unwrap();
        store.append_to_block("a.block", "x").unwrap();
        fs::write(tmp.path().join("c.block.old"), "x\n").unwrap();
        fs::write(tmp.path().join("d.tmp"), "x\n").unwrap();
        fs::write(tmp.path().join("LOCK"), "").unwrap();

        assert_eq!(
            store.list_blocks().unwrap(),
            vec!["a.block".to_string(), "b.block".to_string()]
        );
    }

    #[test]
    fn rename_closes_handle_first() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "x").unwrap();
        store.rename_block("a.block", "a.block.old").unwrap();
        assert!(!tmp.path().join("a.block").exists());
        assert!(tmp.path().join("a.block.old").exists());

        // A fresh append re-creates the live file from scratch.
        store.append_to_block("a.block", "y").unwrap();
        assert_eq!(store.block_stats("a.block").unwrap(), 2);
    }

    #[test]
    fn delete_removes_file() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "x").unwrap();
        store.delete_block("a.block").unwrap();
        assert!(!tmp.path().join("a.block").exists());
    }

    #[test]
    fn closed_store_refuses_work() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "x").unwrap();
        store.close().unwrap();
        store.close().unwrap(); // idempotent

        let err = store.append_to_block("a.block", "y").unwrap_err();
        assert!(matches!(err, StorageError::Closed));
    }

    #[test]
    fn blocks_stats_reports_sizes() {
        let tmp = tempdir().unwrap();
        let mut store = store_in(tmp.path());

        store.append_to_block("a.block", "12345").unwrap();
        store.append_to_block("b.block", "1").unwrap();
        store.flush().unwrap();

        let stats = store.blocks_stats().unwrap();
        assert_eq!(
            stats,
            vec![("a.block".to_string(), 6), ("b.block".to_string(), 2)]
        );
    }
}
