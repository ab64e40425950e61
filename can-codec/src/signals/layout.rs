//! Bit layout of a signal inside a frame payload
//!
//! A layout is a short list of byte-local spans computed from the signal's
//! start bit, size and byte order. The same layout drives both extraction
//! and insertion, so the two are inverses by construction.

use crate::signals::database::SignalDef;

/// Upper bound on spans: a 64-bit signal that starts mid-byte touches 9 bytes
const MAX_SPANS: usize = 9;

/// One contiguous run of bits within a single payload byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitSpan {
    pub byte_index: usize,
    /// Lowest bit position within the byte (0..=7)
    pub bit_offset: u8,
    /// Number of consecutive bits (1..=8)
    pub num_bits: u8,
    /// Where these bits land in the raw value, LSB-relative
    pub value_shift: u8,
}

impl BitSpan {
    fn mask(&self) -> u8 {
        ((1u16 << self.num_bits) - 1) as u8
    }
}

/// Precomputed mapping from a signal to payload bits
///
/// Fixed capacity, so building one never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalLayout {
    spans: [BitSpan; MAX_SPANS],
    len: usize,
    size: u16,
}

impl SignalLayout {
    /// Build a layout using DBC bit numbering.
    ///
    /// Little-endian (Intel): `start_bit` is the LSB, bits walk upward and
    /// continue at bit 0 of the next byte.
    /// Big-endian (Motorola): `start_bit` is the MSB, bits walk downward and
    /// continue at bit 7 of the next byte.
    pub fn new(start_bit: u16, size: u16, is_little_endian: bool) -> Self {
        let size = size.min(64);
        let mut spans = [BitSpan::default(); MAX_SPANS];
        let mut len = 0;
        let mut byte_index = (start_bit / 8) as usize;
        let mut bit_index = (start_bit % 8) as u8;
        let mut remaining = size;
        let mut value_shift: u16 = 0;

        while remaining > 0 && len < MAX_SPANS {
            let span = if is_little_endian {
                let num_bits = (8 - bit_index as u16).min(remaining) as u8;
                let span = BitSpan {
                    byte_index,
                    bit_offset: bit_index,
                    num_bits,
                    value_shift: value_shift as u8,
                };
                value_shift += num_bits as u16;
                remaining -= num_bits as u16;
                bit_index = 0;
                span
            } else {
                let num_bits = (bit_index as u16 + 1).min(remaining) as u8;
                remaining -= num_bits as u16;
                let span = BitSpan {
                    byte_index,
                    bit_offset: bit_index + 1 - num_bits,
                    num_bits,
                    value_shift: remaining as u8,
                };
                bit_index = 7;
                span
            };
            spans[len] = span;
            len += 1;
            byte_index += 1;
        }

        Self { spans, len, size }
    }

    pub fn of(signal: &SignalDef) -> Self {
        Self::new(signal.start_bit, signal.size, signal.is_little_endian)
    }

    pub fn spans(&self) -> &[BitSpan] {
        &self.spans[..self.len]
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    /// Number of payload bytes needed to hold the signal
    pub fn required_bytes(&self) -> usize {
        self.spans()
            .iter()
            .map(|s| s.byte_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Occupied bits as a 64-bit mask, bit `8 * byte + bit` per payload bit.
    ///
    /// Returns None if any span lies beyond byte 7.
    pub fn occupancy(&self) -> Option<u64> {
        let mut mask = 0u64;
        for span in self.spans() {
            if span.byte_index >= 8 {
                return None;
            }
            mask |= (span.mask() as u64) << (span.byte_index * 8 + span.bit_offset as usize);
        }
        Some(mask)
    }

    /// Extract the raw unsigned value. Missing bytes read as zero.
    pub fn extract(&self, data: &[u8]) -> u64 {
        let mut result: u64 = 0;
        for span in self.spans() {
            let byte = data.get(span.byte_index).copied().unwrap_or(0);
            let bits = (byte >> span.bit_offset) & span.mask();
            result |= (bits as u64) << span.value_shift;
        }
        result
    }

    /// Write a raw unsigned value, clearing the target bits first.
    pub fn insert(&self, data: &mut [u8], raw: u64) {
        for span in self.spans() {
            if let Some(byte) = data.get_mut(span.byte_index) {
                let mask = span.mask();
                let bits = ((raw >> span.value_shift) as u8) & mask;
                *byte &= !(mask << span.bit_offset);
                *byte |= bits << span.bit_offset;
            }
        }
    }
}

/// Sign-extend a value from N bits to 64 bits
pub fn sign_extend(value: u64, bit_length: u16) -> i64 {
    if bit_length == 0 || bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}
