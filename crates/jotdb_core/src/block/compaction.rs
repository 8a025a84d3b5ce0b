//! Compaction planning.
//!
//! The rewrite of one block is planned purely over a snapshot of the live
//! index; the engine owns the file I/O and registry surgery around it.
//!
//! ## Invariants
//!
//! - Compaction never changes logical state: `get` answers identically
//!   before and after.
//! - Sequence numbers are never bumped, so a concurrent write to a key being
//!   rewritten wins the merge-back automatically.

use crate::index::{Index, MapEntry};
use crate::types::SeqNo;
use std::sync::Arc;

/// Outcome of compacting one block.
#[derive(Debug, Clone, Default)]
pub struct CompactionStats {
    /// Live entries rewritten into the replacement block.
    pub rewritten_entries: usize,
    /// Size of the victim block before compaction.
    pub bytes_before: u64,
    /// Size of the replacement block.
    pub bytes_after: u64,
}

impl CompactionStats {
    /// Bytes reclaimed by the rewrite.
    #[must_use]
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Selects the live entries to carry from `bid` into its replacement.
///
/// When `min_seq` is given, only entries at or above that sequence number
/// are carried. Output is ordered by sequence number, so the replacement
/// block preserves mutation order and the plan is deterministic.
#[must_use]
pub fn plan_rewrite(index: &Index, bid: &str, min_seq: Option<SeqNo>) -> Vec<Arc<MapEntry>> {
    let mut carried: Vec<Arc<MapEntry>> = index
        .entries()
        .filter(|e| e.bid == bid)
        .filter(|e| min_seq.map_or(true, |floor| e.seq >= floor))
        .cloned()
        .collect();
    carried.sort_by_key(|e| e.seq);
    carried
}

/// Re-homes planned entries onto the replacement block.
#[must_use]
pub fn rehome(planned: &[Arc<MapEntry>], new_bid: &str) -> Vec<Arc<MapEntry>> {
    planned
        .iter()
        .map(|e| {
            Arc::new(MapEntry {
                bid: new_bid.to_string(),
                ..(**e).clone()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, OpTag, Rid};

    fn entry(key: &str, seq: u64, bid: &str) -> Arc<MapEntry> {
        Arc::new(MapEntry {
            key: Key::from(key),
            rid: Rid::new(seq),
            seq: SeqNo::new(seq),
            op: OpTag::SET,
            bid: bid.to_string(),
            line: format!("{{\"id\":\"{key}\"}}"),
            cache: None,
        })
    }

    #[test]
    fn plan_selects_only_the_victim_block() {
        let mut index = Index::new();
        index.insert(entry("a", 1, "x.block"));
        index.insert(entry("b", 2, "y.block"));
        index.insert(entry("c", 3, "x.block"));

        let planned = plan_rewrite(&index, "x.block", None);
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|e| e.bid == "x.block"));
    }

    #[test]
    fn plan_is_ordered_by_sequence() {
        let mut index = Index::new();
        index.insert(entry("c", 9, "x.block"));
        index.insert(entry("a", 2, "x.block"));
        index.insert(entry("b", 5, "x.block"));

        let planned = plan_rewrite(&index, "x.block", None);
        let seqs: Vec<u64> = planned.iter().map(|e| e.seq.as_u64()).collect();
        assert_eq!(seqs, vec![2, 5, 9]);
    }

    #[test]
    fn plan_honours_the_sequence_floor() {
        let mut index = Index::new();
        index.insert(entry("a", 2, "x.block"));
        index.insert(entry("b", 5, "x.block"));

        let planned = plan_rewrite(&index, "x.block", Some(SeqNo::new(5)));
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].key, Key::from("b"));
    }

    #[test]
    fn rehome_preserves_everything_but_the_block() {
        let planned = vec![entry("a", 2, "x.block")];
        let rehomed = rehome(&planned, "z.block");

        assert_eq!(rehomed[0].bid, "z.block");
        assert_eq!(rehomed[0].seq, planned[0].seq);
        assert_eq!(rehomed[0].rid, planned[0].rid);
        assert_eq!(rehomed[0].line, planned[0].line);
    }
}
