//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod kv;

use jotdb_core::Engine;
use std::path::Path;

/// Opens an engine on a store directory with default configuration.
pub fn open_engine(path: &Path) -> Result<Engine, Box<dyn std::error::Error>> {
    Ok(Engine::open(path)?)
}
