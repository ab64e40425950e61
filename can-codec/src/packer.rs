//! Frame packer engine
//!
//! Builds raw payloads from physical signal values. The only state kept
//! between calls is the rolling counter of each address packed so far.

use crate::integrity::{CounterState, Strategy};
use crate::registry::Registry;
use crate::signals::Database;
use crate::types::{CodecError, PackRequest, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct CanPacker {
    database: Arc<Database>,
    counters: HashMap<u32, CounterState>,
}

impl CanPacker {
    /// Create a packer bound to a registered database
    pub fn new(registry: &Registry, database_name: &str) -> Result<Self> {
        let database = registry.get(database_name)?;
        log::debug!("Packer on {}", database.name());
        Ok(Self {
            database,
            counters: HashMap::new(),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Encode a message from (signal name, physical value) pairs.
    ///
    /// Signals not named are zero. A value given for the counter signal
    /// replaces the engine's own counter for this frame; a value given for
    /// the checksum signal is ignored, the checksum is always recomputed.
    pub fn encode(&mut self, address: u32, values: &[(&str, f64)]) -> Result<Vec<u8>> {
        self.encode_with_counter(address, values.iter().copied(), None)
    }

    /// Same as [`CanPacker::encode`]
    pub fn pack(&mut self, address: u32, values: &[(&str, f64)]) -> Result<Vec<u8>> {
        self.encode(address, values)
    }

    /// Encode a `PackRequest`, honoring its counter override
    pub fn encode_request(&mut self, request: &PackRequest) -> Result<Vec<u8>> {
        self.encode_with_counter(
            request.address,
            request.values.iter().map(|v| (v.name.as_str(), v.value)),
            request.counter,
        )
    }

    fn encode_with_counter<'a, I>(
        &mut self,
        address: u32,
        values: I,
        counter: Option<u8>,
    ) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let message = self
            .database
            .message(address)
            .ok_or(CodecError::UnknownMessage(address))?;

        let mut data = vec![0u8; message.size];
        let mut counter_override = counter;

        for (name, value) in values {
            let signal = message.signal(name).ok_or_else(|| CodecError::UnknownSignal {
                address,
                name: name.to_string(),
            })?;
            let raw = signal.to_raw(value)?;
            if signal.role.is_checksum() {
                continue;
            }
            if signal.role.is_counter() {
                counter_override = counter_override.or(Some(raw as u8));
                continue;
            }
            signal.insert_raw(&mut data, raw);
        }

        // Nothing below can fail, so counter state only moves for frames
        // that are actually produced.
        let state = self.counters.entry(address).or_default();
        if let Some(signal) = message.counter_signal() {
            if let Some(value) = counter_override {
                state.override_next(value);
            }
            Strategy::for_role(signal.role).apply(&mut data, address, signal, state);
        }
        if let Some(signal) = message.checksum_signal() {
            Strategy::for_role(signal.role).apply(&mut data, address, signal, state);
        }

        Ok(data)
    }

    /// Last counter value written for an address
    pub fn last_counter(&self, address: u32) -> Option<u8> {
        self.counters.get(&address).and_then(|state| state.last())
    }
}
