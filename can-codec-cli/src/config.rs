//! Configuration and database loading

use anyhow::{Context, Result};
use can_codec::{Database, ParserConfig};
use std::fs;
use std::path::Path;

/// Load a parser configuration from a TOML file
pub fn load_config(path: &Path) -> Result<ParserConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: ParserConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

/// Load a generated database from a JSON file
pub fn load_database(path: &Path) -> Result<Database> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read database file: {:?}", path))?;

    let database: Database = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse database file: {:?}", path))?;

    log::debug!(
        "Loaded database {} ({} messages) from {:?}",
        database.name(),
        database.messages().len(),
        path
    );
    Ok(database)
}
