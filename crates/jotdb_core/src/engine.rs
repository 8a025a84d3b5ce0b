//! Engine facade and recovery.

use crate::block::compaction::{self, CompactionStats};
use crate::block::registry::{self, BlockInfo, BlockRegistry};
use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{EngineError, EngineResult};
use crate::index::{Index, MapEntry};
use crate::record::Record;
use crate::types::{Key, OpTag, Rid, SeqNo};
use jotdb_storage::{BlockStore, BLOCK_EXT, OLD_SUFFIX, TMP_EXT};
use parking_lot::{Condvar, Mutex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Mutable engine state: the index, the block registry, and the counters.
///
/// Guarded by one mutex; every mutation of any part happens under it, which
/// keeps invariants I1–I6 observable at each lock release.
struct State {
    index: Index,
    registry: BlockRegistry,
    seq_no: SeqNo,
    rid_no: Rid,
}

impl State {
    /// Full stale-bytes recompute: walks the live index, sums live bytes per
    /// block, and sets `stale = size - live` for every block. Run after
    /// recovery and after compaction.
    fn recompute_stale(&mut self) {
        let live = self.index.live_bytes_per_block();
        for info in self.registry.iter_mut() {
            let live_bytes = live.get(&info.bid).copied().unwrap_or(0);
            info.stale_bytes = info.size.saturating_sub(live_bytes);
        }
    }
}

struct Inner {
    config: Config,
    /// Holds the directory lock for the engine's lifetime.
    _dir: StoreDir,
    store: Mutex<BlockStore>,
    state: Mutex<State>,
    open: AtomicBool,
    shutdown: Mutex<bool>,
    shutdown_cv: Condvar,
}

impl Inner {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Closed)
        }
    }

    /// Delivers an asynchronous failure (flush timer, background compaction)
    /// to the configured hook.
    fn report_async(&self, err: &EngineError) {
        warn!(error = %err, "background task failed");
        if let Some(hook) = &self.config.on_error {
            hook(err);
        }
    }
}

/// The storage engine: an embedded key-value store over a directory of
/// append-only blocks of newline-delimited JSON.
///
/// # Opening a store
///
/// ```rust,ignore
/// use jotdb_core::{Config, Engine};
/// use serde_json::json;
///
/// let engine = Engine::open(Path::new("my_store"))?;
/// let record = engine.set("user:1", json!({"name": "lemon"}).as_object().unwrap().clone())?;
/// assert_eq!(record.seq.as_u64(), 1);
/// engine.close()?;
/// ```
///
/// All operations are safe to call from multiple threads; index and registry
/// mutations are serialized internally.
pub struct Engine {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Opens an engine on a directory with default configuration.
    pub fn open(path: &Path) -> EngineResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens an engine on a directory.
    ///
    /// Validates options, acquires the directory lock, scans every live
    /// block to rebuild the index (newest `_seq` wins per key, tombstones
    /// evict), pre-allocates one block when the directory is empty,
    /// recomputes stale bytes, and arms the flush and compaction timers.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidOption`] on bad configuration
    /// - [`EngineError::Locked`] when another process holds the directory
    /// - [`EngineError::InvalidRecord`] / empty-line storage errors when any
    ///   block line fails to decode; the engine does not open on decode
    ///   failures
    pub fn open_with_config(path: &Path, config: Config) -> EngineResult<Self> {
        config.validate()?;
        let dir = StoreDir::open(path)?;
        let mut store = BlockStore::open(dir.path(), config.data_sync_delay);

        let mut state = Self::recover(&mut store, &config)?;
        if state.registry.is_empty() {
            let bid = state.registry.allocate(config.max_block_size).bid.clone();
            store.create_block(&bid)?;
            debug!(%bid, "pre-allocated first block");
        }

        info!(
            blocks = state.registry.len(),
            entries = state.index.len(),
            seq = state.seq_no.as_u64(),
            "engine opened"
        );

        let inner = Arc::new(Inner {
            config,
            _dir: dir,
            store: Mutex::new(store),
            state: Mutex::new(state),
            open: AtomicBool::new(true),
            shutdown: Mutex::new(false),
            shutdown_cv: Condvar::new(),
        });

        let engine = Self {
            inner,
            workers: Mutex::new(Vec::new()),
        };
        engine.spawn_workers();
        Ok(engine)
    }

    /// Rebuilds engine state from the live block files.
    fn recover(store: &mut BlockStore, config: &Config) -> EngineResult<State> {
        let mut merged: HashMap<Key, MapEntry> = HashMap::new();
        let mut registry = BlockRegistry::new();
        let mut max_seq = SeqNo::default();

        for (bid, size) in store.blocks_stats()? {
            registry.add(BlockInfo {
                bid: bid.clone(),
                size,
                stale_bytes: 0,
                locked: false,
            });

            for item in store.read_block(&bid)? {
                let (line, line_no) = item?;
                let record = Record::decode_line(&bid, line_no, &line)?;
                max_seq = max_seq.max(record.seq);

                let cache = (!config.cached_fields.is_empty() && record.op.is_set())
                    .then(|| record.project(&config.cached_fields));
                let entry = MapEntry {
                    key: record.key.clone(),
                    rid: record.rid,
                    seq: record.seq,
                    op: record.op,
                    bid: bid.clone(),
                    line,
                    cache,
                };

                // Strict '>' keeps the existing copy, so the later-observed
                // line wins ties and a compaction rewrite of the same
                // (id, _seq) pair is never skipped.
                let keep_existing = merged
                    .get(&record.key)
                    .map_or(false, |existing| existing.seq > entry.seq);
                if !keep_existing {
                    merged.insert(record.key, entry);
                }
            }
        }

        let mut index = Index::new();
        let mut max_rid = Rid::default();
        let mut tombstones = 0usize;
        for (_, entry) in merged {
            if entry.op.is_delete() {
                tombstones += 1;
                continue;
            }
            max_rid = max_rid.max(entry.rid);
            index.insert(Arc::new(entry));
        }
        debug!(entries = index.len(), tombstones, "index rebuilt");

        let mut state = State {
            index,
            registry,
            seq_no: max_seq,
            rid_no: max_rid,
        };
        state.recompute_stale();
        Ok(state)
    }

    fn spawn_workers(&self) {
        let mut workers = self.workers.lock();
        if !self.inner.config.data_sync_delay.is_zero() {
            let inner = Arc::clone(&self.inner);
            workers.push(thread::spawn(move || flush_loop(&inner)));
        }
        if self.inner.config.stale_data_threshold > 0.0 {
            let inner = Arc::clone(&self.inner);
            workers.push(thread::spawn(move || compact_loop(&inner)));
        }
    }

    /// Whether a key is present in the live index.
    pub fn has(&self, key: impl Into<Key>) -> EngineResult<bool> {
        self.inner.ensure_open()?;
        let key = key.into();
        validate_key(&key)?;
        Ok(self.inner.state.lock().index.get(&key).is_some())
    }

    /// Reads the latest record for a key, or `None` if absent.
    ///
    /// Never touches disk in the steady state: the record text is resident
    /// in the index entry. A mismatch between the stored text and the
    /// requested key is a corruption symptom, not a not-found.
    pub fn get(&self, key: impl Into<Key>) -> EngineResult<Option<Record>> {
        self.inner.ensure_open()?;
        let key = key.into();
        validate_key(&key)?;

        let state = self.inner.state.lock();
        let Some(entry) = state.index.get(&key) else {
            return Ok(None);
        };
        let record = Record::decode_line(&entry.bid, 0, &entry.line).map_err(|e| {
            EngineError::corruption(format!("resident record text failed to decode: {e}"))
        })?;
        if record.key != key {
            return Err(EngineError::corruption(format!(
                "index entry for `{key}` holds record for `{}`",
                record.key
            )));
        }
        Ok(Some(record))
    }

    /// Writes a record, overlaying the reserved fields onto `fields`.
    ///
    /// Assigns the next sequence number, preserves the key's `_rid` across
    /// updates (assigning a fresh one on first insert), installs the entry
    /// into the index, charges the displaced copy to its block's stale
    /// counter, and appends the line to the chosen block.
    ///
    /// On append failure the index mutation is kept, not rolled back; the
    /// error propagates and the next recovery reconciles the on-disk state.
    pub fn set(&self, key: impl Into<Key>, fields: Map<String, Value>) -> EngineResult<Record> {
        self.inner.ensure_open()?;
        let key = key.into();
        validate_key(&key)?;

        let mut state = self.inner.state.lock();
        let existing = state.index.get(&key).cloned();

        state.seq_no = state.seq_no.next();
        let seq = state.seq_no;
        let rid = match &existing {
            Some(e) => e.rid,
            None => {
                state.rid_no = state.rid_no.next();
                state.rid_no
            }
        };

        let record = Record::set(key.clone(), fields, rid, seq);
        let line = record.encode_line();
        let cost = line.len() as u64 + 1;

        let bid = state
            .registry
            .allocate(self.inner.config.max_block_size)
            .bid
            .clone();
        let cache = (!self.inner.config.cached_fields.is_empty())
            .then(|| record.project(&self.inner.config.cached_fields));

        let entry = Arc::new(MapEntry {
            key,
            rid,
            seq,
            op: OpTag::SET,
            bid: bid.clone(),
            line: line.clone(),
            cache,
        });
        if let Some(displaced) = state.index.insert(entry) {
            state.registry.add_stale(&displaced.bid, displaced.line_cost());
        }
        state.registry.bump_size(&bid, cost);

        self.inner.store.lock().append_to_block(&bid, &line)?;
        Ok(record)
    }

    /// Deletes a key. Deleting an absent key succeeds without writing.
    ///
    /// The tombstone line consumes a sequence number and is itself charged
    /// as stale: only its `_seq` matters, and only until the next recovery
    /// observes it.
    pub fn delete(&self, key: impl Into<Key>) -> EngineResult<()> {
        self.inner.ensure_open()?;
        let key = key.into();
        validate_key(&key)?;

        let mut state = self.inner.state.lock();
        let Some(existing) = state.index.get(&key).cloned() else {
            return Ok(());
        };

        state.seq_no = state.seq_no.next();
        let seq = state.seq_no;
        let record = Record::tombstone(key.clone(), existing.rid, seq);
        let line = record.encode_line();
        let cost = line.len() as u64 + 1;

        let bid = state
            .registry
            .allocate(self.inner.config.max_block_size)
            .bid
            .clone();
        state.index.remove(&key);
        state.registry.add_stale(&existing.bid, existing.line_cost());
        state.registry.bump_size(&bid, cost);
        state.registry.add_stale(&bid, cost);

        self.inner.store.lock().append_to_block(&bid, &line)?;
        Ok(())
    }

    /// Runs one compaction sweep synchronously, compacting every eligible
    /// block. The background timer drives the same path.
    pub fn compact(&self) -> EngineResult<Vec<CompactionStats>> {
        self.inner.ensure_open()?;
        sweep(&self.inner)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().index.len()
    }

    /// Whether the store holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence number of the latest mutation.
    #[must_use]
    pub fn seq_no(&self) -> SeqNo {
        self.inner.state.lock().seq_no
    }

    /// A snapshot of the block registry.
    #[must_use]
    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.inner.state.lock().registry.snapshot()
    }

    /// Whether the engine accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Closes the engine: cancels timers, waits for the workers, flushes
    /// every open handle, and refuses further operations. Idempotent.
    pub fn close(&self) -> EngineResult<()> {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut stop = self.inner.shutdown.lock();
            *stop = true;
            self.inner.shutdown_cv.notify_all();
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
        self.inner.store.lock().close()?;
        debug!("engine closed");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("is_open", &self.is_open())
            .field("len", &self.len())
            .field("seq_no", &self.seq_no())
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn validate_key(key: &Key) -> EngineResult<()> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(EngineError::invalid_id(
            "id must be a non-empty string or an integer",
        ))
    }
}

fn flush_loop(inner: &Arc<Inner>) {
    let delay = inner.config.data_sync_delay;
    loop {
        let mut stop = inner.shutdown.lock();
        if *stop {
            break;
        }
        inner.shutdown_cv.wait_for(&mut stop, delay);
        if *stop {
            break;
        }
        drop(stop);

        let result = inner.store.lock().sync_dirty();
        if let Err(e) = result {
            inner.report_async(&EngineError::from(e));
        }
    }
}

fn compact_loop(inner: &Arc<Inner>) {
    let delay = inner.config.compact_delay;
    loop {
        let mut stop = inner.shutdown.lock();
        if *stop {
            break;
        }
        inner.shutdown_cv.wait_for(&mut stop, delay);
        if *stop {
            break;
        }
        drop(stop);

        if let Err(e) = sweep(inner) {
            inner.report_async(&e);
        }
    }
}

/// Compacts every currently eligible block.
fn sweep(inner: &Inner) -> EngineResult<Vec<CompactionStats>> {
    let victims = {
        let state = inner.state.lock();
        state.registry.drainable(
            inner.config.max_block_size,
            inner.config.stale_data_threshold,
        )
    };
    let mut all = Vec::with_capacity(victims.len());
    for bid in victims {
        all.push(compact_block(inner, &bid, None)?);
    }
    Ok(all)
}

/// Compacts one block: locks it, rewrites its live entries into a fresh
/// file, swaps the registry entry, merges the rewrite back into the index,
/// and retires the victim to `.old`. Sequence numbers are never bumped, so
/// writes that landed during the rewrite win the merge.
fn compact_block(
    inner: &Inner,
    bid: &str,
    min_seq: Option<SeqNo>,
) -> EngineResult<CompactionStats> {
    let (planned, bytes_before) = {
        let mut state = inner.state.lock();
        let Some(info) = state.registry.get(bid) else {
            return Ok(CompactionStats::default());
        };
        if info.locked {
            return Ok(CompactionStats::default());
        }
        let bytes_before = info.size;
        state.registry.set_locked(bid, true);
        (
            compaction::plan_rewrite(&state.index, bid, min_seq),
            bytes_before,
        )
    };

    debug!(bid, entries = planned.len(), "compaction started");
    match rewrite_block(inner, bid, &planned, bytes_before) {
        Ok(stats) => {
            info!(
                bid,
                reclaimed = stats.bytes_reclaimed(),
                "compaction finished"
            );
            Ok(stats)
        }
        Err(e) => {
            // Unlock so the block takes writes again; any partial `.tmp`
            // artifact is invisible to recovery and safe to leave behind.
            inner.state.lock().registry.set_locked(bid, false);
            Err(e)
        }
    }
}

fn rewrite_block(
    inner: &Inner,
    bid: &str,
    planned: &[Arc<MapEntry>],
    bytes_before: u64,
) -> EngineResult<CompactionStats> {
    let token = registry::new_token();
    let tmp = format!("{token}{TMP_EXT}");
    let new_bid = format!("{token}{BLOCK_EXT}");

    // Rewrite the live entries into the sibling file, then make it live.
    let mut bytes_after = 0u64;
    {
        let mut store = inner.store.lock();
        store.create_block(&tmp)?;
        for entry in planned {
            store.append_to_block(&tmp, &entry.line)?;
            bytes_after += entry.line_cost();
        }
        store.flush_block(&tmp)?;
        store.close_block(&tmp);
        store.rename_block(&tmp, &new_bid)?;
    }

    // Swap the registry entry and merge the rewrite back into the index.
    {
        let mut state = inner.state.lock();
        for entry in compaction::rehome(planned, &new_bid) {
            // A concurrent write with a higher sequence wins; a key deleted
            // while the rewrite ran must not be resurrected.
            let merge = state
                .index
                .get(&entry.key)
                .map_or(false, |current| current.seq <= entry.seq);
            if merge {
                state.index.insert(entry);
            }
        }

        let strays: Vec<Key> = state
            .index
            .entries()
            .filter(|e| e.bid == bid)
            .map(|e| e.key.clone())
            .collect();
        if !strays.is_empty() {
            warn!(bid, count = strays.len(), "evicting stray entries for retired block");
            for key in &strays {
                state.index.remove(key);
            }
        }

        state.registry.remove(bid);
        state.registry.add(BlockInfo {
            bid: new_bid.clone(),
            size: bytes_after,
            stale_bytes: 0,
            locked: false,
        });
        state.recompute_stale();
    }

    // Retire the victim. Its `.old` residue is ignored on reopen.
    {
        let mut store = inner.store.lock();
        store.close_block(bid);
        store.rename_block(bid, &format!("{bid}{OLD_SUFFIX}"))?;
    }

    Ok(CompactionStats {
        rewritten_entries: planned.len(),
        bytes_before,
        bytes_after,
    })
}
