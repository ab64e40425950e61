//! Core types for the CAN signal codec
//!
//! This module defines the values that flow in and out of the parser and
//! packer engines: raw frames, live signal values, snapshots and the error
//! taxonomy shared by the whole crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic timestamp in milliseconds
pub type Timestamp = u64;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Maximum payload length of a classic CAN frame
pub const MAX_FRAME_LEN: usize = 8;

/// Raw CAN frame as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Bus the frame was received on
    pub bus: u8,
    /// CAN arbitration ID (11-bit or 29-bit)
    pub address: u32,
    /// Payload bytes (0-8 for classic CAN)
    pub data: Vec<u8>,
    /// Monotonic receive time in milliseconds
    pub timestamp: Timestamp,
}

impl CanFrame {
    pub fn new(bus: u8, address: u32, data: impl Into<Vec<u8>>, timestamp: Timestamp) -> Self {
        Self {
            bus,
            address,
            data: data.into(),
            timestamp,
        }
    }

    /// Data length code - number of payload bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Errors raised by registration, engine construction and encoding
///
/// Per-frame decode problems (unknown address, wrong size, integrity
/// failure) are never reported here. They are absorbed into parser state
/// and surface through the snapshot validity flag.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Database already registered: {0}")]
    DuplicateDatabase(String),

    #[error("Database not registered: {0}")]
    UnknownDatabase(String),

    #[error("Invalid database {name}: {reason}")]
    InvalidDatabase { name: String, reason: String },

    #[error("Invalid parser configuration: {0}")]
    InvalidConfig(String),

    #[error("Message not found: CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("Signal not found in message 0x{address:X}: {name}")]
    UnknownSignal { address: u32, name: String },

    #[error("Value {value} does not fit signal {name}")]
    OutOfRange { name: String, value: f64 },
}

/// Latest known value of one tracked signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveValue {
    /// CAN ID of the message carrying the signal
    pub address: u32,
    /// Signal name from the database
    pub signal_name: String,
    /// Physical value (raw * factor + offset)
    pub value: f64,
    /// Time of the frame that produced the value, or the parser's start
    /// time while no frame has been received
    pub timestamp: Timestamp,
    /// False while `value` is still the configured default
    #[serde(default)]
    pub received: bool,
}

impl fmt::Display for LiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:X}.{} = {:.3} @ {}ms",
            self.address, self.signal_name, self.value, self.timestamp
        )
    }
}

/// Point-in-time copy of everything a parser tracks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// False if any frequency-checked message is missing, stale or corrupt
    pub valid: bool,
    /// Time the snapshot was taken
    pub timestamp: Timestamp,
    /// Tracked values ordered by address, then signal name
    pub values: Vec<LiveValue>,
}

impl Snapshot {
    /// Find a tracked value by address and signal name
    pub fn get(&self, address: u32, signal_name: &str) -> Option<&LiveValue> {
        self.values
            .iter()
            .find(|v| v.address == address && v.signal_name == signal_name)
    }

    /// Physical value of a tracked signal
    pub fn value(&self, address: u32, signal_name: &str) -> Option<f64> {
        self.get(address, signal_name).map(|v| v.value)
    }
}

/// A caller-supplied encode request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackRequest {
    pub address: u32,
    pub values: Vec<PackValue>,
    /// Explicit rolling counter value, replacing the engine's own sequence
    #[serde(default)]
    pub counter: Option<u8>,
}

/// Desired physical value of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackValue {
    pub name: String,
    pub value: f64,
}

impl PackRequest {
    pub fn new(address: u32) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    /// Builder method: set a signal value
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.push(PackValue {
            name: name.into(),
            value,
        });
        self
    }

    /// Builder method: override the rolling counter
    pub fn with_counter(mut self, counter: u8) -> Self {
        self.counter = Some(counter);
        self
    }
}
