//! CAN Signal Codec Library
//!
//! Decodes and encodes CAN frames against per-vehicle signal databases,
//! keeping a freshness-checked view of the latest signal values for a
//! control loop and producing checksummed, countered frames for
//! transmission.
//!
//! # Architecture
//!
//! - [`Registry`] holds immutable [`Database`]s by name
//! - [`CanParser`] (one per bus) decodes subscribed messages, validates
//!   checksums and rolling counters and tracks per-message liveness
//! - [`CanPacker`] (one per vehicle) encodes payloads and fills in
//!   counters and checksums
//! - [`LiveValueStore`] and [`SnapshotReader`] expose the parsed state as
//!   owned snapshots
//!
//! The library does NOT:
//! - Parse DBC files (databases come from an external generator)
//! - Talk to a CAN interface
//! - Interpret what a signal means
//!
//! No operation blocks or performs I/O; decode and encode run in time
//! proportional to the number of signals in the message.
//!
//! # Example Usage
//!
//! ```
//! use can_codec::{CanPacker, CanParser, Database, MessageDef, ParserConfig, Registry, SignalDef};
//!
//! let speed = MessageDef::new(
//!     "WHEEL_SPEEDS",
//!     0x1A0,
//!     8,
//!     vec![SignalDef::new("SPEED", 0, 8).scaled(0.01, 0.0)],
//! );
//! let registry = Registry::new();
//! registry.register(Database::new("demo", vec![speed], vec![])).unwrap();
//!
//! let mut packer = CanPacker::new(&registry, "demo").unwrap();
//! let payload = packer.encode(0x1A0, &[("SPEED", 2.55)]).unwrap();
//!
//! let config = ParserConfig::new("demo")
//!     .add_message(0x1A0, 10)
//!     .add_signal(0x1A0, "SPEED", 0.0);
//! let mut parser = CanParser::from_config(&registry, &config).unwrap();
//! parser.decode_frame(0x1A0, &payload, 100);
//!
//! let snapshot = parser.query(105);
//! assert!(snapshot.valid);
//! assert!((snapshot.value(0x1A0, "SPEED").unwrap() - 2.55).abs() < 1e-9);
//! ```

// Public modules
pub mod config;
pub mod integrity;
pub mod packer;
pub mod parser;
pub mod registry;
pub mod signals;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{MessageParseOptions, ParserConfig, SignalParseOptions};
pub use integrity::{CounterState, Strategy};
pub use packer::CanPacker;
pub use parser::{CanParser, MessageStats};
pub use registry::Registry;
pub use signals::{Database, DatabaseStats, MessageDef, SignalDef, SignalRole, ValueDef};
pub use store::{LiveValueStore, SnapshotReader};
pub use types::{
    CanFrame, CodecError, LiveValue, PackRequest, PackValue, Result, Snapshot, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
