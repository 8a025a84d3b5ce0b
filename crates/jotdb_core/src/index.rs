//! In-memory primary index.

use crate::types::{Key, OpTag, Rid, SeqNo};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One live record as tracked by the index.
///
/// Carries the exact JSON text that was appended so steady-state reads never
/// touch disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// Record id.
    pub key: Key,
    /// Stable record identity.
    pub rid: Rid,
    /// Sequence number of the mutation that produced this entry.
    pub seq: SeqNo,
    /// Operation tag of the stored line.
    pub op: OpTag,
    /// Name of the block file holding the authoritative copy.
    pub bid: String,
    /// The exact record text, without the trailing newline.
    pub line: String,
    /// Optional projection of user-declared fields for hot-path reads.
    pub cache: Option<Map<String, Value>>,
}

impl MapEntry {
    /// Bytes this entry occupies on disk: UTF-8 line length plus newline.
    #[must_use]
    pub fn line_cost(&self) -> u64 {
        self.line.len() as u64 + 1
    }
}

/// The primary map (id → entry) and its reverse mirror (`_rid` → entry).
///
/// Both maps are kept consistent under every mutation: an entry present in
/// one is present in the other, and only there.
#[derive(Debug, Default)]
pub struct Index {
    by_key: HashMap<Key, Arc<MapEntry>>,
    by_rid: HashMap<u64, Arc<MapEntry>>,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry by record id.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Arc<MapEntry>> {
        self.by_key.get(key)
    }

    /// Looks up an entry by stable record identity.
    #[must_use]
    pub fn get_by_rid(&self, rid: Rid) -> Option<&Arc<MapEntry>> {
        self.by_rid.get(&rid.as_u64())
    }

    /// Installs an entry in both maps, returning the displaced entry for the
    /// same key, if any.
    pub fn insert(&mut self, entry: Arc<MapEntry>) -> Option<Arc<MapEntry>> {
        let displaced = self.by_key.insert(entry.key.clone(), Arc::clone(&entry));
        if let Some(old) = &displaced {
            self.by_rid.remove(&old.rid.as_u64());
        }
        self.by_rid.insert(entry.rid.as_u64(), entry);
        displaced
    }

    /// Evicts an entry from both maps.
    pub fn remove(&mut self, key: &Key) -> Option<Arc<MapEntry>> {
        let removed = self.by_key.remove(key)?;
        self.by_rid.remove(&removed.rid.as_u64());
        Some(removed)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Iterates over all live entries.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<MapEntry>> {
        self.by_key.values()
    }

    /// Live bytes per block: the sum of line costs of entries pointing at
    /// each block. The input to the full stale-bytes recompute.
    #[must_use]
    pub fn live_bytes_per_block(&self) -> HashMap<String, u64> {
        let mut live = HashMap::new();
        for entry in self.by_key.values() {
            *live.entry(entry.bid.clone()).or_insert(0) += entry.line_cost();
        }
        live
    }
}
