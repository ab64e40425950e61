//! Signal database model and bit layout
//!
//! The database is produced by an external generator; this module only
//! models it and checks its layout invariants.

pub mod database;
pub mod layout;

// Re-export key types for convenience
pub use database::{
    Database, DatabaseStats, MessageDef, SignalDef, SignalRole, ValueDef,
};
pub use layout::{sign_extend, BitSpan, SignalLayout};
