//! Vehicle signal database
//!
//! Owned, immutable description of the messages on one vehicle variant.
//! A `Database` owns its `MessageDef`s, which own their `SignalDef`s. The
//! address index is built once at construction.

use crate::signals::layout::{sign_extend, SignalLayout};
use crate::types::{CodecError, Result, MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Role of a signal within its message
///
/// Anything other than `Plain` selects an integrity strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalRole {
    #[default]
    Plain,
    HondaChecksum,
    HondaCounter,
    ToyotaChecksum,
    PedalChecksum,
    PedalCounter,
}

impl SignalRole {
    pub fn is_checksum(&self) -> bool {
        matches!(
            self,
            SignalRole::HondaChecksum | SignalRole::ToyotaChecksum | SignalRole::PedalChecksum
        )
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, SignalRole::HondaCounter | SignalRole::PedalCounter)
    }

    pub fn is_integrity(&self) -> bool {
        self.is_checksum() || self.is_counter()
    }

    /// Payload bits a checksum of this role must occupy in a message of
    /// `size` bytes: the low nibble (Honda) or all (Toyota, Pedal) of the
    /// last byte. None for roles that are not checksums.
    pub fn checksum_bits(&self, size: usize) -> Option<u64> {
        let shift = 8 * (size.clamp(1, 8) - 1);
        match self {
            SignalRole::HondaChecksum => Some(0x0Fu64 << shift),
            SignalRole::ToyotaChecksum | SignalRole::PedalChecksum => Some(0xFFu64 << shift),
            _ => None,
        }
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDef {
    /// Signal name, unique within its message
    pub name: String,
    /// LSB position for little-endian signals, MSB position for big-endian
    pub start_bit: u16,
    /// Length in bits (1..=64)
    pub size: u16,
    pub is_little_endian: bool,
    pub is_signed: bool,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    #[serde(default)]
    pub role: SignalRole,
}

impl SignalDef {
    /// Unsigned, little-endian, unscaled plain signal
    pub fn new(name: impl Into<String>, start_bit: u16, size: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            size,
            is_little_endian: true,
            is_signed: false,
            factor: 1.0,
            offset: 0.0,
            role: SignalRole::Plain,
        }
    }

    /// Builder method: Motorola byte order
    pub fn big_endian(mut self) -> Self {
        self.is_little_endian = false;
        self
    }

    /// Builder method: two's complement raw value
    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    /// Builder method: linear scaling
    pub fn scaled(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Builder method: integrity role
    pub fn with_role(mut self, role: SignalRole) -> Self {
        self.role = role;
        self
    }

    pub fn layout(&self) -> SignalLayout {
        SignalLayout::of(self)
    }

    /// Raw field bits, unsigned
    pub fn extract_raw(&self, data: &[u8]) -> u64 {
        self.layout().extract(data)
    }

    /// Physical value of this signal in `data`
    pub fn decode(&self, data: &[u8]) -> f64 {
        self.to_physical(self.extract_raw(data))
    }

    /// physical = raw * factor + offset, sign-extending first if needed
    pub fn to_physical(&self, raw: u64) -> f64 {
        let value = if self.is_signed {
            sign_extend(raw, self.size) as f64
        } else {
            raw as f64
        };
        value * self.factor + self.offset
    }

    /// raw = round((physical - offset) / factor), as field bits
    ///
    /// Fails if the rounded value cannot be represented in the signal's
    /// width and signedness.
    pub fn to_raw(&self, physical: f64) -> Result<u64> {
        let raw = ((physical - self.offset) / self.factor).round();
        let out_of_range = || CodecError::OutOfRange {
            name: self.name.clone(),
            value: physical,
        };
        if !raw.is_finite() {
            return Err(out_of_range());
        }

        let size = self.size.clamp(1, 64) as u32;
        let (min, max): (i128, i128) = if self.is_signed {
            (-(1i128 << (size - 1)), (1i128 << (size - 1)) - 1)
        } else {
            (0, (1i128 << size) - 1)
        };

        let raw = raw as i128;
        if raw < min || raw > max {
            return Err(out_of_range());
        }
        Ok((raw as u64) & self.mask())
    }

    /// Write raw bits into `data`
    pub fn insert_raw(&self, data: &mut [u8], raw: u64) {
        self.layout().insert(data, raw & self.mask());
    }

    /// All-ones mask of the signal width
    pub fn mask(&self) -> u64 {
        if self.size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size) - 1
        }
    }
}

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDef {
    pub name: String,
    /// CAN arbitration ID
    pub address: u32,
    /// Payload size in bytes
    pub size: usize,
    /// Signals in bit layout order
    pub signals: Vec<SignalDef>,
}

impl MessageDef {
    pub fn new(name: impl Into<String>, address: u32, size: usize, signals: Vec<SignalDef>) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            signals,
        }
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn checksum_signal(&self) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.role.is_checksum())
    }

    pub fn counter_signal(&self) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.role.is_counter())
    }

    /// Check the layout invariants of this message
    fn validate(&self) -> std::result::Result<(), String> {
        if self.size == 0 || self.size > MAX_FRAME_LEN {
            return Err(format!(
                "message 0x{:X} has size {} (expected 1..={})",
                self.address, self.size, MAX_FRAME_LEN
            ));
        }

        let mut names = HashSet::new();
        let mut occupied = 0u64;
        for signal in &self.signals {
            if !names.insert(signal.name.as_str()) {
                return Err(format!(
                    "message 0x{:X} defines signal {} twice",
                    self.address, signal.name
                ));
            }
            if signal.size == 0 || signal.size > 64 {
                return Err(format!(
                    "signal {} in message 0x{:X} has size {}",
                    signal.name, self.address, signal.size
                ));
            }
            if signal.role.is_counter() && signal.size > 8 {
                return Err(format!(
                    "counter {} in message 0x{:X} is wider than 8 bits",
                    signal.name, self.address
                ));
            }

            let layout = signal.layout();
            let bits = match layout.occupancy() {
                Some(bits) if layout.required_bytes() <= self.size => bits,
                _ => {
                    return Err(format!(
                        "signal {} does not fit in the {} bytes of message 0x{:X}",
                        signal.name, self.size, self.address
                    ))
                }
            };
            if let Some(expected) = signal.role.checksum_bits(self.size) {
                if bits != expected {
                    return Err(format!(
                        "{:?} {} in message 0x{:X} must fill {} of byte {}",
                        signal.role,
                        signal.name,
                        self.address,
                        if expected.count_ones() == 4 { "the low nibble" } else { "all" },
                        self.size - 1
                    ));
                }
            }
            if occupied & bits != 0 {
                return Err(format!(
                    "signal {} overlaps another signal in message 0x{:X}",
                    signal.name, self.address
                ));
            }
            occupied |= bits;
        }

        if self.signals.iter().filter(|s| s.role.is_checksum()).count() > 1 {
            return Err(format!("message 0x{:X} has more than one checksum", self.address));
        }
        if self.signals.iter().filter(|s| s.role.is_counter()).count() > 1 {
            return Err(format!("message 0x{:X} has more than one counter", self.address));
        }
        Ok(())
    }
}

/// Value description table for an enumerated signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDef {
    /// Name of the signal the table describes
    pub name: String,
    pub address: u32,
    /// DBC value description text, e.g. `"3 D 2 N 1 R 0 P"`
    pub def_val: String,
}

impl ValueDef {
    pub fn new(name: impl Into<String>, address: u32, def_val: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address,
            def_val: def_val.into(),
        }
    }

    /// Parse the description text into (raw value, label) pairs
    ///
    /// A numeric token starts a new entry once the current label has at
    /// least one word, so multi-word labels are kept together.
    pub fn entries(&self) -> Vec<(i64, String)> {
        let mut entries: Vec<(i64, String)> = Vec::new();
        for token in self.def_val.split_whitespace() {
            let label_open = entries.last().map_or(false, |(_, label)| label.is_empty());
            match token.parse::<i64>() {
                Ok(raw) if !label_open => entries.push((raw, String::new())),
                _ => {
                    if let Some((_, label)) = entries.last_mut() {
                        if !label.is_empty() {
                            label.push(' ');
                        }
                        label.push_str(token.trim_matches('"'));
                    }
                }
            }
        }
        entries
    }

    /// Label for a raw value
    pub fn describe(&self, raw: i64) -> Option<String> {
        self.entries()
            .into_iter()
            .find(|(value, _)| *value == raw)
            .map(|(_, label)| label)
    }
}

/// Serialized form of a database; the address index is rebuilt on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatabaseParts {
    name: String,
    messages: Vec<MessageDef>,
    #[serde(default)]
    values: Vec<ValueDef>,
}

/// Immutable per-vehicle message database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "DatabaseParts", into = "DatabaseParts")]
pub struct Database {
    name: String,
    messages: Vec<MessageDef>,
    values: Vec<ValueDef>,
    /// CAN ID -> index into `messages`
    index: HashMap<u32, usize>,
}

impl From<DatabaseParts> for Database {
    fn from(parts: DatabaseParts) -> Self {
        Database::new(parts.name, parts.messages, parts.values)
    }
}

impl From<Database> for DatabaseParts {
    fn from(db: Database) -> Self {
        DatabaseParts {
            name: db.name,
            messages: db.messages,
            values: db.values,
        }
    }
}

impl Database {
    /// Build a database. Layout invariants are checked at registration.
    pub fn new(name: impl Into<String>, messages: Vec<MessageDef>, values: Vec<ValueDef>) -> Self {
        let mut index = HashMap::with_capacity(messages.len());
        for (idx, message) in messages.iter().enumerate() {
            index.entry(message.address).or_insert(idx);
        }
        Self {
            name: name.into(),
            messages,
            values,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    pub fn value_defs(&self) -> &[ValueDef] {
        &self.values
    }

    pub fn message(&self, address: u32) -> Option<&MessageDef> {
        self.index.get(&address).map(|&idx| &self.messages[idx])
    }

    pub fn message_by_name(&self, name: &str) -> Option<&MessageDef> {
        self.messages.iter().find(|m| m.name == name)
    }

    /// Resolve a signal, reporting which part of the lookup failed
    pub fn signal(&self, address: u32, name: &str) -> Result<&SignalDef> {
        self.message(address)
            .ok_or(CodecError::UnknownMessage(address))?
            .signal(name)
            .ok_or_else(|| CodecError::UnknownSignal {
                address,
                name: name.to_string(),
            })
    }

    pub fn value_def(&self, address: u32, signal_name: &str) -> Option<&ValueDef> {
        self.values
            .iter()
            .find(|v| v.address == address && v.name == signal_name)
    }

    /// The signal a value table applies to
    pub fn value_signal(&self, value_def: &ValueDef) -> Option<&SignalDef> {
        self.signal(value_def.address, &value_def.name).ok()
    }

    /// Label of a raw value for an enumerated signal
    pub fn describe(&self, address: u32, signal_name: &str, raw: i64) -> Option<String> {
        self.value_def(address, signal_name)?.describe(raw)
    }

    /// Check every layout invariant
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| CodecError::InvalidDatabase {
            name: self.name.clone(),
            reason,
        };

        if self.index.len() != self.messages.len() {
            return Err(invalid("duplicate message address".to_string()));
        }
        for message in &self.messages {
            message.validate().map_err(invalid)?;
        }
        for value_def in &self.values {
            if self.value_signal(value_def).is_none() {
                return Err(invalid(format!(
                    "value table for unknown signal 0x{:X}.{}",
                    value_def.address, value_def.name
                )));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.iter().map(|m| m.signals.len()).sum(),
            num_value_defs: self.values.len(),
        }
    }

    /// All CAN IDs in the database, sorted
    pub fn addresses(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub num_messages: usize,
    pub num_signals: usize,
    pub num_value_defs: usize,
}
