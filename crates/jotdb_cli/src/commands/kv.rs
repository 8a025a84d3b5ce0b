//! Key-value command implementations.

use super::open_engine;
use serde_json::Value;
use std::path::Path;

/// Runs the get command.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    match engine.get(key)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record.to_value())?),
        None => println!("(not found)"),
    }
    engine.close()?;
    Ok(())
}

/// Runs the set command. `value` must be a JSON object.
pub fn set(path: &Path, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed: Value = serde_json::from_str(value)?;
    let Value::Object(fields) = parsed else {
        return Err("value must be a JSON object".into());
    };

    let engine = open_engine(path)?;
    let record = engine.set(key, fields)?;
    println!("{}", serde_json::to_string_pretty(&record.to_value())?);
    engine.close()?;
    Ok(())
}

/// Runs the del command.
pub fn del(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    engine.delete(key)?;
    println!("deleted {key}");
    engine.close()?;
    Ok(())
}

/// Runs the has command.
pub fn has(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    println!("{}", engine.has(key)?);
    engine.close()?;
    Ok(())
}
