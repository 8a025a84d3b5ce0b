//! Block registry and allocation.

use jotdb_storage::BLOCK_EXT;
use rand::Rng;

/// Length of the random token in a block file name.
const TOKEN_LEN: usize = 12;

/// Metadata for one live block file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block file name, extension included.
    pub bid: String,
    /// Size in bytes: on-disk length plus bytes accepted by the OS but not
    /// yet flushed. Always at least the bytes reachable from the index.
    pub size: u64,
    /// Bytes in this block no longer reachable from the live index.
    pub stale_bytes: u64,
    /// Whether this block is currently being compacted. Locked blocks take
    /// no appends and are skipped by allocation.
    pub locked: bool,
}

impl BlockInfo {
    /// Creates a fresh, empty, unlocked block entry.
    #[must_use]
    pub fn new(bid: String) -> Self {
        Self {
            bid,
            size: 0,
            stale_bytes: 0,
            locked: false,
        }
    }
}

/// Generates a fresh opaque block token.
#[must_use]
pub fn new_token() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generates a fresh block file name (token plus the reserved extension).
#[must_use]
pub fn new_bid() -> String {
    format!("{}{BLOCK_EXT}", new_token())
}

/// Ordered list of live blocks plus the sticky allocation cursor.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: Vec<BlockInfo>,
    /// Index of the block most recently chosen for a write.
    last_used: Option<usize>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chooses the destination block for the next append.
    ///
    /// The most recently used block is sticky while it stays unlocked and
    /// under the size cap; otherwise the scan moves strictly forward in
    /// registry order, and when nothing qualifies a fresh block is
    /// synthesized and appended. `max_block_size` is a soft cap: the caller
    /// may overflow the chosen block by at most one record.
    pub fn allocate(&mut self, max_block_size: u64) -> &BlockInfo {
        let usable =
            |info: &BlockInfo| -> bool { !info.locked && info.size < max_block_size };

        if let Some(last) = self.last_used {
            if self.blocks.get(last).is_some_and(&usable) {
                return &self.blocks[last];
            }
            let from = last + 1;
            if let Some(offset) = self.blocks[from.min(self.blocks.len())..]
                .iter()
                .position(&usable)
            {
                let idx = from + offset;
                self.last_used = Some(idx);
                return &self.blocks[idx];
            }
        } else if let Some(idx) = self.blocks.iter().position(&usable) {
            self.last_used = Some(idx);
            return &self.blocks[idx];
        }

        self.blocks.push(BlockInfo::new(new_bid()));
        let idx = self.blocks.len() - 1;
        self.last_used = Some(idx);
        &self.blocks[idx]
    }

    /// Registers an existing block (recovery, compaction replacement).
    pub fn add(&mut self, info: BlockInfo) {
        self.blocks.push(info);
    }

    /// Removes a block from the registry, keeping the allocation cursor
    /// pointing at the block it pointed at before, where possible.
    pub fn remove(&mut self, bid: &str) -> Option<BlockInfo> {
        let idx = self.blocks.iter().position(|b| b.bid == bid)?;
        let removed = self.blocks.remove(idx);
        self.last_used = match self.last_used {
            Some(last) if last == idx => None,
            Some(last) if last > idx => Some(last - 1),
            other => other,
        };
        Some(removed)
    }

    /// Looks up a block by name.
    #[must_use]
    pub fn get(&self, bid: &str) -> Option<&BlockInfo> {
        self.blocks.iter().find(|b| b.bid == bid)
    }

    /// Looks up a block by name, mutably.
    pub fn get_mut(&mut self, bid: &str) -> Option<&mut BlockInfo> {
        self.blocks.iter_mut().find(|b| b.bid == bid)
    }

    /// Charges bytes to a block's stale counter.
    pub fn add_stale(&mut self, bid: &str, bytes: u64) {
        if let Some(info) = self.get_mut(bid) {
            info.stale_bytes += bytes;
        }
    }

    /// Grows a block's size bookkeeping by the bytes just accepted.
    pub fn bump_size(&mut self, bid: &str, bytes: u64) {
        if let Some(info) = self.get_mut(bid) {
            info.size += bytes;
        }
    }

    /// Marks a block locked or unlocked for compaction.
    pub fn set_locked(&mut self, bid: &str, locked: bool) {
        if let Some(info) = self.get_mut(bid) {
            info.locked = locked;
        }
    }

    /// Names of blocks eligible for compaction: unlocked and holding at
    /// least `max_block_size * threshold` stale bytes. A zero threshold
    /// disables compaction.
    #[must_use]
    pub fn drainable(&self, max_block_size: u64, threshold: f64) -> Vec<String> {
        if threshold <= 0.0 {
            return Vec::new();
        }
        let floor = (max_block_size as f64 * threshold) as u64;
        self.blocks
            .iter()
            .filter(|b| !b.locked && b.stale_bytes >= floor)
            .map(|b| b.bid.clone())
            .collect()
    }

    /// Number of registered blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the registry holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterates over registered blocks in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter()
    }

    /// Iterates mutably over registered blocks.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BlockInfo> {
        self.blocks.iter_mut()
    }

    /// A snapshot of all block metadata.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BlockInfo> {
        self.blocks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(sizes: &[u64]) -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        for (i, &size) in sizes.iter().enumerate() {
            registry.add(BlockInfo {
                bid: format!("b{i}.block"),
                size,
                stale_bytes: 0,
                locked: false,
            });
        }
        registry
    }

    #[test]
    fn new_bid_shape() {
        let bid = new_bid();
        assert!(bid.ends_with(BLOCK_EXT));
        let token = bid.strip_suffix(BLOCK_EXT).unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(new_bid(), bid);
    }

    #[test]
    fn empty_registry_synthesizes_a_block() {
        let mut registry = BlockRegistry::new();
        let bid = registry.allocate(1024).bid.clone();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&bid).unwrap().size, 0);
    }

    #[test]
    fn allocation_sticks_to_last_used() {
        let mut registry = registry_with(&[100, 100]);
        let first = registry.allocate(1024).bid.clone();
        let second = registry.allocate(1024).bid.clone();
        assert_eq!(first, second);
        assert_eq!(first, "b0.block");
    }

    #[test]
    fn full_block_moves_the_scan_forward() {
        let mut registry = registry_with(&[100, 100]);
        assert_eq!(registry.allocate(1024).bid, "b0.block");
        registry.get_mut("b0.block").unwrap().size = 1024;
        assert_eq!(registry.allocate(1024).bid, "b1.block");
    }

    #[test]
    fn locked_blocks_are_skipped() {
        let mut registry = registry_with(&[100, 100]);
        assert_eq!(registry.allocate(1024).bid, "b0.block");
        registry.set_locked("b0.block", true);
        assert_eq!(registry.allocate(1024).bid, "b1.block");
    }

    #[test]
    fn scan_does_not_wrap_backwards() {
        // The forward scan starts after the cursor; earlier blocks with room
        // are not revisited, a fresh block is synthesized instead.
        let mut registry = registry_with(&[100, 1024]);
        assert_eq!(registry.allocate(1024).bid, "b0.block");
        registry.get_mut("b0.block").unwrap().size = 1024;

        let chosen = registry.allocate(1024).bid.clone();
        assert_ne!(chosen, "b0.block");
        assert_ne!(chosen, "b1.block");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn all_full_synthesizes_fresh_block() {
        let mut registry = registry_with(&[2048, 2048]);
        let bid = registry.allocate(1024).bid.clone();
        assert_eq!(registry.len(), 3);
        // Fresh block becomes sticky.
        assert_eq!(registry.allocate(1024).bid, bid);
    }

    #[test]
    fn remove_adjusts_the_cursor() {
        let mut registry = registry_with(&[100, 100, 100]);
        registry.get_mut("b0.block").unwrap().size = 1024;
        assert_eq!(registry.allocate(1024).bid, "b1.block");

        registry.remove("b0.block").unwrap();
        // Cursor still points at b1; allocation stays sticky.
        assert_eq!(registry.allocate(1024).bid, "b1.block");
    }

    #[test]
    fn remove_current_resets_the_cursor() {
        let mut registry = registry_with(&[100, 100]);
        assert_eq!(registry.allocate(1024).bid, "b0.block");
        registry.remove("b0.block").unwrap();
        assert_eq!(registry.allocate(1024).bid, "b1.block");
    }

    #[test]
    fn drainable_respects_threshold_and_locks() {
        let mut registry = registry_with(&[1000, 1000, 1000]);
        registry.add_stale("b0.block", 200);
        registry.add_stale("b1.block", 50);
        registry.add_stale("b2.block", 300);
        registry.set_locked("b2.block", true);

        // floor = 1024 * 0.1 = 102 bytes
        assert_eq!(registry.drainable(1024, 0.1), vec!["b0.block".to_string()]);
        assert!(registry.drainable(1024, 0.0).is_empty());
    }
}
