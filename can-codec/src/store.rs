//! Live value store
//!
//! Holds the latest value of every subscribed signal for one parser and
//! turns it into owned `Snapshot`s. Snapshots are also published through a
//! `SnapshotReader`, which other tasks can hold without touching the parser.

use crate::types::{LiveValue, Snapshot, Timestamp};
use std::collections::BTreeMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    value: f64,
    /// None until the first intact frame arrives
    received_at: Option<Timestamp>,
}

/// Latest values keyed by (address, signal name)
#[derive(Debug)]
pub struct LiveValueStore {
    started_at: Timestamp,
    slots: BTreeMap<(u32, String), Slot>,
    reader: SnapshotReader,
}

impl LiveValueStore {
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            started_at,
            slots: BTreeMap::new(),
            reader: SnapshotReader::default(),
        }
    }

    /// Values never received report this timestamp
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn set_started_at(&mut self, started_at: Timestamp) {
        self.started_at = started_at;
    }

    /// Start tracking a signal with its pre-reception value
    pub fn track(&mut self, address: u32, name: &str, default_value: f64) {
        self.slots.insert(
            (address, name.to_string()),
            Slot {
                value: default_value,
                received_at: None,
            },
        );
    }

    pub fn is_tracked(&self, address: u32) -> bool {
        self.tracked_signals(address).next().is_some()
    }

    /// Names of the tracked signals of one message
    pub fn tracked_signals(&self, address: u32) -> impl Iterator<Item = &str> {
        self.slots
            .range((address, String::new())..)
            .take_while(move |((a, _), _)| *a == address)
            .map(|((_, name), _)| name.as_str())
    }

    /// Overwrite every tracked signal of one message.
    ///
    /// `decode` maps a signal name to its new value; names it returns None
    /// for keep their previous value.
    pub fn update<F>(&mut self, address: u32, timestamp: Timestamp, mut decode: F)
    where
        F: FnMut(&str) -> Option<f64>,
    {
        for ((_, name), slot) in self
            .slots
            .range_mut((address, String::new())..)
            .take_while(|((a, _), _)| *a == address)
        {
            if let Some(value) = decode(name) {
                slot.value = value;
                slot.received_at = Some(timestamp);
            }
        }
    }

    pub fn get(&self, address: u32, name: &str) -> Option<LiveValue> {
        self.slots
            .get(&(address, name.to_string()))
            .map(|slot| self.live_value(address, name, slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn live_value(&self, address: u32, name: &str, slot: &Slot) -> LiveValue {
        LiveValue {
            address,
            signal_name: name.to_string(),
            value: slot.value,
            timestamp: slot.received_at.unwrap_or(self.started_at),
            received: slot.received_at.is_some(),
        }
    }

    /// Owned copy of every tracked value
    pub fn snapshot(&self, valid: bool, now: Timestamp) -> Snapshot {
        Snapshot {
            valid,
            timestamp: now,
            values: self
                .slots
                .iter()
                .map(|((address, name), slot)| self.live_value(*address, name, slot))
                .collect(),
        }
    }

    /// Make a snapshot visible to every `SnapshotReader`
    pub fn publish(&self, snapshot: Snapshot) {
        self.reader.publish(snapshot);
    }

    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }
}

/// Read side of the snapshot channel
///
/// Cloning is cheap; all clones see the most recently published snapshot.
/// A snapshot is replaced as a whole, so readers never observe a value
/// paired with another frame's timestamp.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReader {
    latest: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotReader {
    /// Most recently published snapshot (invalid and empty before the first)
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.latest.read())
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.latest.write() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_defaults_carry_start_timestamp() {
        let mut store = LiveValueStore::new(500);
        store.track(0x1A0, "SPEED", 12.5);

        let value = store.get(0x1A0, "SPEED").unwrap();
        assert_eq!(value.value, 12.5);
        assert_eq!(value.timestamp, 500);
    }

    #[test]
    fn test_update_only_touches_one_address() {
        let mut store = LiveValueStore::new(0);
        store.track(0x1A0, "SPEED", 0.0);
        store.track(0x1A0, "ACCEL", 0.0);
        store.track(0x1A1, "SPEED", 0.0);

        store.update(0x1A0, 40, |name| match name {
            "SPEED" => Some(3.0),
            _ => None,
        });

        assert_eq!(store.get(0x1A0, "SPEED").unwrap().timestamp, 40);
        assert_eq!(store.get(0x1A0, "ACCEL").unwrap().timestamp, 0);
        assert_eq!(store.get(0x1A1, "SPEED").unwrap().value, 0.0);

        let names: Vec<&str> = store.tracked_signals(0x1A0).collect();
        assert_eq!(names, vec!["ACCEL", "SPEED"]);
        assert!(store.is_tracked(0x1A1));
        assert!(!store.is_tracked(0x1A2));
    }

    #[test]
    fn test_snapshot_order() {
        let mut store = LiveValueStore::new(0);
        store.track(0x300, "B", 0.0);
        store.track(0x100, "Z", 0.0);
        store.track(0x100, "A", 0.0);

        let snapshot = store.snapshot(true, 10);
        let keys: Vec<(u32, &str)> = snapshot
            .values
            .iter()
            .map(|v| (v.address, v.signal_name.as_str()))
            .collect();
        assert_eq!(keys, vec![(0x100, "A"), (0x100, "Z"), (0x300, "B")]);
    }

    #[test]
    fn test_reader_sees_published_snapshot() {
        let mut store = LiveValueStore::new(0);
        store.track(0x1A0, "SPEED", 0.0);
        let reader = store.reader();
        assert!(!reader.latest().valid);

        store.update(0x1A0, 20, |_| Some(7.0));
        store.publish(store.snapshot(true, 25));

        let handle = thread::spawn(move || reader.latest());
        let seen = handle.join().unwrap();
        assert!(seen.valid);
        assert_eq!(seen.value(0x1A0, "SPEED"), Some(7.0));
        assert_eq!(seen.get(0x1A0, "SPEED").unwrap().timestamp, 20);
    }
}
