//! Parser configuration types
//!
//! A `ParserConfig` is the subscription of one parser engine: which
//! messages to frequency-check, which signals to publish and with what
//! default, and how much delay is tolerated before data counts as stale.

use crate::types::{CodecError, Result};
use serde::{Deserialize, Serialize};

/// Configuration of one frame parser engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Bus this parser reads; frames from other buses are skipped
    #[serde(default)]
    pub bus: u8,

    /// Name of the registered database to decode against
    pub database: String,

    /// A message is stale once no frame arrived for this many periods
    #[serde(default = "default_staleness_multiplier")]
    pub staleness_multiplier: u64,

    /// Messages to track and their expected period
    #[serde(default)]
    pub messages: Vec<MessageParseOptions>,

    /// Signals to publish and their value before the first frame
    #[serde(default)]
    pub signals: Vec<SignalParseOptions>,
}

fn default_staleness_multiplier() -> u64 {
    10
}

/// Message subscription with an optional frequency constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParseOptions {
    pub address: u32,
    /// Expected period in milliseconds; 0 disables the freshness check
    #[serde(default)]
    pub expected_period_ms: u64,
}

/// Signal subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalParseOptions {
    pub address: u32,
    pub name: String,
    #[serde(default)]
    pub default_value: f64,
}

impl MessageParseOptions {
    pub fn new(address: u32, expected_period_ms: u64) -> Self {
        Self {
            address,
            expected_period_ms,
        }
    }
}

impl SignalParseOptions {
    pub fn new(address: u32, name: impl Into<String>, default_value: f64) -> Self {
        Self {
            address,
            name: name.into(),
            default_value,
        }
    }
}

impl ParserConfig {
    /// Create a configuration for a database with default settings
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            bus: 0,
            database: database.into(),
            staleness_multiplier: default_staleness_multiplier(),
            messages: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Builder method: set the bus
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    /// Builder method: set the staleness multiplier
    pub fn with_staleness_multiplier(mut self, multiplier: u64) -> Self {
        self.staleness_multiplier = multiplier;
        self
    }

    /// Builder method: track a message with an expected period
    pub fn add_message(mut self, address: u32, expected_period_ms: u64) -> Self {
        self.messages
            .push(MessageParseOptions::new(address, expected_period_ms));
        self
    }

    /// Builder method: publish a signal
    pub fn add_signal(mut self, address: u32, name: impl Into<String>, default_value: f64) -> Self {
        self.signals
            .push(SignalParseOptions::new(address, name, default_value));
        self
    }

    /// Every subscribed address, sorted and deduplicated
    pub fn addresses(&self) -> Vec<u32> {
        let mut addresses: Vec<u32> = self
            .messages
            .iter()
            .map(|m| m.address)
            .chain(self.signals.iter().map(|s| s.address))
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
    }

    /// Expected period of a message, if it is frequency-checked
    pub fn expected_period(&self, address: u32) -> Option<u64> {
        self.messages
            .iter()
            .filter(|m| m.address == address && m.expected_period_ms > 0)
            .map(|m| m.expected_period_ms)
            .min()
    }
    /// Reject settings no parser can run with.
    ///
    /// A zero staleness multiplier would make every frequency-checked
    /// message stale as soon as any time passes after its last frame.
    pub fn validate(&self) -> Result<()> {
        if self.staleness_multiplier == 0 {
            return Err(CodecError::InvalidConfig(
                "staleness_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
