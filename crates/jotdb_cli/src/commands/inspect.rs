//! Inspect command implementation.

use super::open_engine;
use jotdb_storage::OLD_SUFFIX;
use std::fs;
use std::path::Path;

/// Runs the inspect command.
pub fn run(path: &Path, show_blocks: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let blocks = engine.blocks();

    let total_size: u64 = blocks.iter().map(|b| b.size).sum();
    let total_stale: u64 = blocks.iter().map(|b| b.stale_bytes).sum();
    let residue = fs::read_dir(path)?
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(OLD_SUFFIX))
        .count();

    println!("Store at {}", path.display());
    println!("  Live records:  {}", engine.len());
    println!("  Last sequence: {}", engine.seq_no().as_u64());
    println!("  Blocks:        {}", blocks.len());
    println!("  Total bytes:   {total_size}");
    println!(
        "  Stale bytes:   {total_stale} ({:.1}%)",
        if total_size > 0 {
            total_stale as f64 / total_size as f64 * 100.0
        } else {
            0.0
        }
    );
    println!("  .old residue:  {residue} file(s)");

    if show_blocks {
        println!();
        println!("Blocks:");
        for block in &blocks {
            println!(
                "  {}  size={}  stale={}  locked={}",
                block.bid, block.size, block.stale_bytes, block.locked
            );
        }
    }

    engine.close()?;
    Ok(())
}
