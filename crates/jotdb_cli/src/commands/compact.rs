//! Compact command implementation.

use super::open_engine;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let stats = engine.compact()?;

    if stats.is_empty() {
        println!("No blocks eligible for compaction");
    } else {
        let reclaimed: u64 = stats.iter().map(|s| s.bytes_reclaimed()).sum();
        let rewritten: usize = stats.iter().map(|s| s.rewritten_entries).sum();
        println!("Compacted {} block(s)", stats.len());
        println!("  Records rewritten: {rewritten}");
        println!("  Bytes reclaimed:   {reclaimed}");
    }

    engine.close()?;
    Ok(())
}
