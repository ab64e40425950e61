//! Integrity strategies
//!
//! Checksum and rolling-counter schemes, selected by a signal's role and
//! dispatched through two operations: `validate` on decode and `apply` on
//! encode. Encoding places counters before checksums, since checksums are
//! computed over the final payload.

use crate::signals::{SignalDef, SignalRole};
use byteorder::{BigEndian, ByteOrder};

/// Integrity scheme attached to a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain signal, nothing to check
    NoIntegrity,
    /// 4-bit nibble-sum checksum in the low nibble of the last byte
    HondaChecksum,
    /// 8-bit byte-sum checksum in the last byte
    ToyotaChecksum,
    /// CRC-8 (poly 0xD5) in the last byte
    PedalChecksum,
    /// Counter incrementing by one per frame, modulo 2^width
    RollingCounter,
}

impl Strategy {
    pub fn for_role(role: SignalRole) -> Self {
        match role {
            SignalRole::Plain => Strategy::NoIntegrity,
            SignalRole::HondaChecksum => Strategy::HondaChecksum,
            SignalRole::ToyotaChecksum => Strategy::ToyotaChecksum,
            SignalRole::PedalChecksum => Strategy::PedalChecksum,
            SignalRole::HondaCounter | SignalRole::PedalCounter => Strategy::RollingCounter,
        }
    }

    /// Expected checksum for a payload, or None for non-checksum strategies
    pub fn checksum(&self, address: u32, data: &[u8]) -> Option<u8> {
        match self {
            Strategy::HondaChecksum => Some(honda_checksum(address, data)),
            Strategy::ToyotaChecksum => Some(toyota_checksum(address, data)),
            Strategy::PedalChecksum => Some(pedal_checksum(address, data)),
            Strategy::NoIntegrity | Strategy::RollingCounter => None,
        }
    }

    /// Check the field of `signal` in a received payload.
    ///
    /// Counters compare against the previous observation and then
    /// resynchronize to the observed value whatever the outcome.
    pub fn validate(
        &self,
        data: &[u8],
        address: u32,
        signal: &SignalDef,
        counter: &mut CounterState,
    ) -> bool {
        match self {
            Strategy::NoIntegrity => true,
            Strategy::RollingCounter => {
                let observed = signal.extract_raw(data) as u8;
                counter.observe(observed, signal.mask() as u8)
            }
            _ => self
                .checksum(address, data)
                .map_or(true, |expected| signal.extract_raw(data) == expected as u64),
        }
    }

    /// Write the field of `signal` into an outgoing payload.
    pub fn apply(
        &self,
        data: &mut [u8],
        address: u32,
        signal: &SignalDef,
        counter: &mut CounterState,
    ) {
        match self {
            Strategy::NoIntegrity => {}
            Strategy::RollingCounter => {
                let value = counter.advance(signal.mask() as u8);
                signal.insert_raw(data, value as u64);
            }
            _ => {
                if let Some(checksum) = self.checksum(address, data) {
                    signal.insert_raw(data, checksum as u64);
                }
            }
        }
    }
}

/// Rolling counter state of one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    last: Option<u8>,
    pending: Option<u8>,
}

impl CounterState {
    /// Last counter value seen (decode) or written (encode)
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Make the next `apply` write `value` instead of advancing
    pub fn override_next(&mut self, value: u8) {
        self.pending = Some(value);
    }

    /// Record an observed counter. The first observation only synchronizes.
    fn observe(&mut self, observed: u8, mask: u8) -> bool {
        let in_sequence = match self.last {
            Some(last) => last.wrapping_add(1) & mask == observed & mask,
            None => true,
        };
        self.last = Some(observed & mask);
        in_sequence
    }

    /// Next value to transmit: 0 first, then last + 1 wrapping at the mask.
    fn advance(&mut self, mask: u8) -> u8 {
        let next = match self.pending.take() {
            Some(value) => value & mask,
            None => self.last.map_or(0, |last| last.wrapping_add(1) & mask),
        };
        self.last = Some(next);
        next
    }
}

/// Sum of the 4-bit nibbles of a value
fn nibble_sum(mut value: u64) -> u64 {
    let mut sum = 0;
    while value != 0 {
        sum += value & 0xF;
        value >>= 4;
    }
    sum
}

/// Honda checksum: every nibble of the address and of the payload (minus the
/// checksum nibble itself) is summed, and the checksum is `8 - sum` mod 16.
pub fn honda_checksum(address: u32, data: &[u8]) -> u8 {
    let len = data.len().min(8);
    if len == 0 {
        return 0;
    }
    let payload = BigEndian::read_uint(&data[..len], len) >> 4;
    let sum = nibble_sum(address as u64) + nibble_sum(payload);
    (8u64.wrapping_sub(sum) & 0xF) as u8
}

/// Toyota checksum: payload length plus every address byte plus every payload
/// byte except the last, mod 256.
pub fn toyota_checksum(address: u32, data: &[u8]) -> u8 {
    let len = data.len().min(8);
    let address_sum: u32 = address.to_le_bytes().iter().map(|&b| b as u32).sum();
    let data_sum: u32 = data[..len.saturating_sub(1)].iter().map(|&b| b as u32).sum();
    ((len as u32 + address_sum + data_sum) & 0xFF) as u8
}

/// Comma pedal checksum: CRC-8, polynomial 0xD5, initial value 0xFF, over all
/// bytes but the last, starting with the byte nearest the checksum.
pub fn pedal_checksum(_address: u32, data: &[u8]) -> u8 {
    const POLY: u8 = 0xD5;
    let len = data.len().min(8);
    let mut crc: u8 = 0xFF;
    for &byte in data[..len.saturating_sub(1)].iter().rev() {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}
