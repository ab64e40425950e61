//! Database registry
//!
//! Explicit, shareable table of vehicle databases keyed by name. Databases
//! are registered once during initialization and never removed; engines
//! keep an `Arc` to the database they were built against, so the hot path
//! never touches the registry lock.

use crate::signals::Database;
use crate::types::{CodecError, Result};
use std::collections::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Registry {
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a database under its own name.
    ///
    /// Fails with `InvalidDatabase` if the layout invariants do not hold and
    /// with `DuplicateDatabase` if the name is taken. Either failure means
    /// the vehicle configuration is broken and initialization should stop.
    pub fn register(&self, database: Database) -> Result<Arc<Database>> {
        database.validate()?;

        let mut databases = self.databases.write();

        if databases.contains_key(database.name()) {
            return Err(CodecError::DuplicateDatabase(database.name().to_string()));
        }

        let stats = database.stats();
        log::info!(
            "Registered database {} ({} messages, {} signals)",
            database.name(),
            stats.num_messages,
            stats.num_signals
        );

        let database = Arc::new(database);
        databases.insert(database.name().to_string(), Arc::clone(&database));
        Ok(database)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.read().get(name).cloned()
    }

    /// Like `lookup`, failing with `UnknownDatabase`
    pub fn get(&self, name: &str) -> Result<Arc<Database>> {
        self.lookup(name)
            .ok_or_else(|| CodecError::UnknownDatabase(name.to_string()))
    }

    /// Registered database names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .read()
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.databases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
