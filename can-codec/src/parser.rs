//! Frame parser engine
//!
//! One `CanParser` per bus. It decodes the subscribed messages of a raw
//! frame stream, checks checksums and rolling counters, keeps per-message
//! liveness and publishes the latest values through its `LiveValueStore`.
//!
//! Frame problems never surface as errors. Unknown and unsubscribed
//! addresses are skipped, wrongly sized frames are dropped, and integrity
//! failures are recorded; the last two only show up through the validity
//! flag of the next snapshot.

use crate::config::{MessageParseOptions, ParserConfig, SignalParseOptions};
use crate::integrity::{CounterState, Strategy};
use crate::registry::Registry;
use crate::signals::Database;
use crate::store::{LiveValueStore, SnapshotReader};
use crate::types::{CanFrame, CodecError, Result, Snapshot, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Freshness and integrity state of one subscribed message
#[derive(Debug, Clone, Default)]
struct LivenessRecord {
    /// Time of the last correctly sized frame, intact or not
    last_seen: Option<Timestamp>,
    /// Frequency constraint in milliseconds
    expected_period: Option<u64>,
    counter: CounterState,
    /// Set by a checksum/counter failure, cleared by the next intact frame
    integrity_failed: bool,
    frames_seen: u64,
    integrity_failures: u64,
    malformed_frames: u64,
}

/// Diagnostic view of one subscribed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStats {
    pub address: u32,
    pub expected_period: Option<u64>,
    pub last_seen: Option<Timestamp>,
    pub last_counter: Option<u8>,
    pub integrity_failed: bool,
    pub frames_seen: u64,
    pub integrity_failures: u64,
    pub malformed_frames: u64,
}

pub struct CanParser {
    bus: u8,
    database: Arc<Database>,
    staleness_multiplier: u64,
    liveness: BTreeMap<u32, LivenessRecord>,
    store: LiveValueStore,
    was_valid: bool,
}

impl CanParser {
    /// Create a parser for one bus.
    ///
    /// Every address named in `message_options` or `signal_options` is
    /// subscribed. Fails if the database is not registered or an option
    /// names a message or signal the database does not define.
    pub fn new(
        bus: u8,
        registry: &Registry,
        database_name: &str,
        message_options: &[MessageParseOptions],
        signal_options: &[SignalParseOptions],
    ) -> Result<Self> {
        let mut config = ParserConfig::new(database_name).with_bus(bus);
        config.messages = message_options.to_vec();
        config.signals = signal_options.to_vec();
        Self::from_config(registry, &config)
    }

    pub fn from_config(registry: &Registry, config: &ParserConfig) -> Result<Self> {
        config.validate()?;
        let database = registry.get(&config.database)?;

        let mut liveness = BTreeMap::new();
        for address in config.addresses() {
            if database.message(address).is_none() {
                return Err(CodecError::UnknownMessage(address));
            }
            liveness.insert(
                address,
                LivenessRecord {
                    expected_period: config.expected_period(address),
                    ..Default::default()
                },
            );
        }

        let mut store = LiveValueStore::new(0);
        for option in &config.signals {
            database.signal(option.address, &option.name)?;
            store.track(option.address, &option.name, option.default_value);
        }

        log::debug!(
            "Parser for bus {} on {}: {} messages, {} signals",
            config.bus,
            database.name(),
            liveness.len(),
            store.len()
        );

        Ok(Self {
            bus: config.bus,
            database,
            staleness_multiplier: config.staleness_multiplier,
            liveness,
            store,
            was_valid: false,
        })
    }

    /// Builder method: timestamp reported for values never received.
    ///
    /// Defaults to 0, which is also a valid frame time; check
    /// `LiveValue::received` rather than the timestamp to tell a default
    /// from a decoded value.
    pub fn started_at(mut self, timestamp: Timestamp) -> Self {
        self.store.set_started_at(timestamp);
        self
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Decode one raw frame
    pub fn decode_frame(&mut self, address: u32, data: &[u8], timestamp: Timestamp) {
        let Some(record) = self.liveness.get_mut(&address) else {
            log::trace!("Ignoring unsubscribed CAN ID 0x{:X}", address);
            return;
        };
        let Some(message) = self.database.message(address) else {
            return;
        };

        if data.len() != message.size {
            record.malformed_frames += 1;
            log::warn!(
                "Dropping {} (0x{:X}): {} bytes, expected {}",
                message.name,
                address,
                data.len(),
                message.size
            );
            return;
        }

        // Both checks always run so the counter resynchronizes even when
        // the checksum is already known to be bad.
        let mut intact = true;
        if let Some(signal) = message.checksum_signal() {
            intact &= Strategy::for_role(signal.role).validate(data, address, signal, &mut record.counter);
        }
        if let Some(signal) = message.counter_signal() {
            intact &= Strategy::for_role(signal.role).validate(data, address, signal, &mut record.counter);
        }

        record.last_seen = Some(timestamp);
        record.frames_seen += 1;

        if !intact {
            record.integrity_failed = true;
            record.integrity_failures += 1;
            log::warn!(
                "Integrity failure on {} (0x{:X}) at {}ms",
                message.name,
                address,
                timestamp
            );
            return;
        }
        record.integrity_failed = false;

        self.store.update(address, timestamp, |name| {
            message.signal(name).map(|signal| signal.decode(data))
        });
    }

    /// Decode a time slice of frames in order, skipping other buses
    pub fn decode_frames<'a, I>(&mut self, frames: I)
    where
        I: IntoIterator<Item = &'a CanFrame>,
    {
        for frame in frames {
            if frame.bus != self.bus {
                log::trace!("Skipping frame from bus {} on parser for bus {}", frame.bus, self.bus);
                continue;
            }
            self.decode_frame(frame.address, &frame.data, frame.timestamp);
        }
    }

    /// Evaluate freshness at `now` and take a snapshot.
    ///
    /// The snapshot is invalid if any frequency-checked message was never
    /// seen, has been silent for longer than `staleness_multiplier` times
    /// its period, or failed its last integrity check. The snapshot is also
    /// published to every `SnapshotReader`.
    pub fn tick(&mut self, now: Timestamp) -> Snapshot {
        let mut valid = true;
        for (address, record) in &self.liveness {
            let Some(period) = record.expected_period else {
                continue;
            };
            let tolerance = period.saturating_mul(self.staleness_multiplier);
            let fresh = record
                .last_seen
                .map_or(false, |seen| now.saturating_sub(seen) <= tolerance);

            if !fresh || record.integrity_failed {
                if self.was_valid {
                    log::warn!(
                        "Bus {}: 0x{:X} is {} at {}ms",
                        self.bus,
                        address,
                        if fresh { "corrupt" } else { "stale" },
                        now
                    );
                }
                valid = false;
            }
        }

        if valid && !self.was_valid {
            log::info!("Bus {}: all tracked messages valid at {}ms", self.bus, now);
        }
        self.was_valid = valid;

        let snapshot = self.store.snapshot(valid, now);
        self.store.publish(snapshot.clone());
        snapshot
    }

    /// Full snapshot of validity and values at `now`
    pub fn query(&mut self, now: Timestamp) -> Snapshot {
        self.tick(now)
    }

    /// Handle for reading published snapshots from other tasks
    pub fn reader(&self) -> SnapshotReader {
        self.store.reader()
    }

    /// Per-message diagnostics, ordered by address
    pub fn stats(&self) -> Vec<MessageStats> {
        self.liveness
            .iter()
            .map(|(&address, record)| MessageStats {
                address,
                expected_period: record.expected_period,
                last_seen: record.last_seen,
                last_counter: record.counter.last(),
                integrity_failed: record.integrity_failed,
                frames_seen: record.frames_seen,
                integrity_failures: record.integrity_failures,
                malformed_frames: record.malformed_frames,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{MessageDef, SignalDef, SignalRole};

    fn registry() -> Registry {
        let speed = MessageDef::new(
            "WHEEL_SPEEDS",
            0x1A0,
            8,
            vec![
                SignalDef::new("SPEED", 0, 8).scaled(0.01, 0.0),
                SignalDef::new("COUNTER", 8, 4).with_role(SignalRole::PedalCounter),
            ],
        );
        let gas = MessageDef::new(
            "GAS",
            0x200,
            2,
            vec![SignalDef::new("PEDAL", 0, 16).signed()],
        );
        let registry = Registry::new();
        registry
            .register(Database::new("test", vec![speed, gas], vec![]))
            .unwrap();
        registry
    }

    fn parser(registry: &Registry) -> CanParser {
        let config = ParserConfig::new("test")
            .add_message(0x1A0, 10)
            .add_signal(0x1A0, "SPEED", -1.0)
            .add_signal(0x200, "PEDAL", 0.0);
        CanParser::from_config(registry, &config).unwrap()
    }

    #[test]
    fn test_decode_speed() {
        let registry = registry();
        let mut parser = parser(&registry);

        parser.decode_frame(0x1A0, &[100, 0, 0, 0, 0, 0, 0, 0], 5);
        let snapshot = parser.query(5);
        assert!(snapshot.valid);
        assert!((snapshot.value(0x1A0, "SPEED").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(snapshot.get(0x1A0, "SPEED").unwrap().timestamp, 5);
    }

    #[test]
    fn test_unknown_database_and_options() {
        let registry = registry();
        let err = CanParser::new(0, &registry, "missing", &[], &[]).err();
        assert_eq!(err, Some(CodecError::UnknownDatabase("missing".to_string())));

        let err = CanParser::new(0, &registry, "test", &[MessageParseOptions::new(0x7FF, 10)], &[]).err();
        assert_eq!(err, Some(CodecError::UnknownMessage(0x7FF)));

        let err = CanParser::new(
            0,
            &registry,
            "test",
            &[],
            &[SignalParseOptions::new(0x1A0, "RPM", 0.0)],
        )
        .err();
        assert!(matches!(err, Some(CodecError::UnknownSignal { .. })));
    }

    #[test]
    fn test_zero_staleness_multiplier_is_rejected() {
        let registry = registry();
        let config = ParserConfig::new("test")
            .with_staleness_multiplier(0)
            .add_message(0x1A0, 10);
        assert!(matches!(
            CanParser::from_config(&registry, &config),
            Err(CodecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wrong_size_is_not_seen() {
        let registry = registry();
        let mut parser = parser(&registry);

        parser.decode_frame(0x1A0, &[100, 0, 0], 5);
        let stats = parser.stats();
        assert_eq!(stats[0].address, 0x1A0);
        assert_eq!(stats[0].last_seen, None);
        assert_eq!(stats[0].malformed_frames, 1);
        assert!(!parser.query(5).valid);
    }

    #[test]
    fn test_message_without_signals_only_tracks_freshness() {
        let registry = registry();
        let config = ParserConfig::new("test").add_message(0x1A0, 10);
        let mut parser = CanParser::from_config(&registry, &config).unwrap();

        parser.decode_frame(0x1A0, &[1, 0, 0, 0, 0, 0, 0, 0], 0);
        let snapshot = parser.query(1);
        assert!(snapshot.valid);
        assert!(snapshot.values.is_empty());
    }

    #[test]
    fn test_signed_signal_and_message_without_frequency() {
        let registry = registry();
        let mut parser = parser(&registry);

        parser.decode_frame(0x200, &[0xFE, 0xFF], 3);
        let snapshot = parser.query(3);
        assert_eq!(snapshot.value(0x200, "PEDAL"), Some(-2.0));
        // 0x1A0 is frequency-checked and was never seen
        assert!(!snapshot.valid);
    }

    #[test]
    fn test_started_at_marks_defaults() {
        let registry = registry();
        let mut parser = parser(&registry).started_at(1_000);

        let snapshot = parser.query(1_000);
        let speed = snapshot.get(0x1A0, "SPEED").unwrap();
        assert_eq!(speed.value, -1.0);
        assert_eq!(speed.timestamp, 1_000);
        assert!(!speed.received);
    }

    #[test]
    fn test_frame_at_time_zero_is_distinguishable_from_default() {
        let registry = registry();
        let mut parser = parser(&registry);

        let before = parser.query(0);
        let speed = before.get(0x1A0, "SPEED").unwrap();
        assert_eq!((speed.timestamp, speed.received), (0, false));

        parser.decode_frame(0x1A0, &[0, 0, 0, 0, 0, 0, 0, 0], 0);
        let after = parser.query(0);
        let speed = after.get(0x1A0, "SPEED").unwrap();
        assert_eq!((speed.timestamp, speed.received), (0, true));
        assert_eq!(speed.value, 0.0);
        // Never-decoded signal of another message keeps its default
        assert!(!after.get(0x200, "PEDAL").unwrap().received);
    }

    #[test]
    fn test_decode_frames_filters_bus() {
        let registry = registry();
        let mut parser = parser(&registry);
        let frames = vec![
            CanFrame::new(1, 0x1A0, vec![50, 0, 0, 0, 0, 0, 0, 0], 1),
            CanFrame::new(0, 0x1A0, vec![20, 0, 0, 0, 0, 0, 0, 0], 2),
        ];

        parser.decode_frames(&frames);
        let snapshot = parser.query(2);
        assert!((snapshot.value(0x1A0, "SPEED").unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(parser.stats()[0].frames_seen, 1);
    }
}
