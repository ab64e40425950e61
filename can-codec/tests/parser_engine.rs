// End-to-end behaviour of the frame parser engine

mod common;

use can_codec::{CanPacker, CanParser, ParserConfig, Registry};
use common::*;

fn speed_parser(registry: &Registry) -> CanParser {
    let config = ParserConfig::new("test_vehicle")
        .add_message(WHEEL_SPEEDS, 10)
        .add_signal(WHEEL_SPEEDS, "SPEED", 0.0);
    CanParser::from_config(registry, &config).unwrap()
}

fn speed_frame(speed_raw: u8, counter: u8) -> [u8; 8] {
    [speed_raw, counter & 0x0F, 0, 0, 0, 0, 0, 0]
}

#[test]
fn test_speed_example() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    parser.decode_frame(WHEEL_SPEEDS, &[100, 0, 0, 0, 0, 0, 0, 0], 0);
    let snapshot = parser.query(0);
    assert!((snapshot.value(WHEEL_SPEEDS, "SPEED").unwrap() - 1.00).abs() < 1e-9);
}

#[test]
fn test_packed_counter_sequence_passes() {
    let registry = registry();
    let mut packer = CanPacker::new(&registry, "test_vehicle").unwrap();
    let mut parser = speed_parser(&registry);

    for (i, speed) in [0.5, 0.6, 0.7].iter().enumerate() {
        let frame = packer.encode(WHEEL_SPEEDS, &[("SPEED", *speed)]).unwrap();
        assert_eq!(frame[1] & 0x0F, i as u8);
        parser.decode_frame(WHEEL_SPEEDS, &frame, i as u64 * 10);
    }

    let snapshot = parser.query(20);
    assert!(snapshot.valid);
    assert!((snapshot.value(WHEEL_SPEEDS, "SPEED").unwrap() - 0.7).abs() < 1e-9);
    assert_eq!(parser.stats()[0].integrity_failures, 0);
}

#[test]
fn test_skipped_counter_suppresses_whole_frame() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(100, 0), 0);
    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(200, 2), 10);

    let snapshot = parser.query(10);
    assert!(!snapshot.valid);
    // The corrupt frame's speed is not published
    let speed = snapshot.get(WHEEL_SPEEDS, "SPEED").unwrap();
    assert!((speed.value - 1.0).abs() < 1e-9);
    assert_eq!(speed.timestamp, 0);

    let stats = &parser.stats()[0];
    assert_eq!(stats.integrity_failures, 1);
    assert_eq!(stats.last_seen, Some(10));
    assert_eq!(stats.last_counter, Some(2));
}

#[test]
fn test_counter_resynchronizes_after_gap() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(1, 0), 0);
    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(2, 2), 10);
    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(3, 3), 20);

    let snapshot = parser.query(20);
    assert!(snapshot.valid);
    assert!((snapshot.value(WHEEL_SPEEDS, "SPEED").unwrap() - 0.03).abs() < 1e-9);
    assert_eq!(parser.stats()[0].integrity_failures, 1);
}

#[test]
fn test_static_or_jumping_counter_fails() {
    let registry = registry();

    for sequence in [[4u8, 4], [4, 6], [15, 15], [15, 2]] {
        let mut parser = speed_parser(&registry);
        parser.decode_frame(WHEEL_SPEEDS, &speed_frame(1, sequence[0]), 0);
        parser.decode_frame(WHEEL_SPEEDS, &speed_frame(1, sequence[1]), 10);
        assert!(!parser.query(10).valid, "sequence {:?}", sequence);
    }

    // Wrapping from 15 to 0 is in sequence
    let mut parser = speed_parser(&registry);
    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(1, 15), 0);
    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(1, 0), 10);
    assert!(parser.query(10).valid);
}

#[test]
fn test_staleness_and_recovery() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    // Never seen
    assert!(!parser.query(0).valid);

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(10, 0), 1_000);
    assert!(parser.query(1_000).valid);
    // 10ms period x 10 tolerance
    assert!(parser.query(1_100).valid);
    assert!(!parser.query(1_101).valid);

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(20, 1), 1_500);
    assert!(parser.query(1_500).valid);
}

#[test]
fn test_checksum_failure_and_recovery() {
    let registry = registry();
    let mut packer = CanPacker::new(&registry, "test_vehicle").unwrap();
    let config = ParserConfig::new("test_vehicle")
        .add_message(STEER_STATUS, 10)
        .add_signal(STEER_STATUS, "STEER_ANGLE", 0.0);
    let mut parser = CanParser::from_config(&registry, &config).unwrap();

    let good = packer.encode(STEER_STATUS, &[("STEER_ANGLE", -12.5)]).unwrap();
    parser.decode_frame(STEER_STATUS, &good, 0);
    let snapshot = parser.query(0);
    assert!(snapshot.valid);
    assert!((snapshot.value(STEER_STATUS, "STEER_ANGLE").unwrap() + 12.5).abs() < 1e-9);

    let mut corrupt = packer.encode(STEER_STATUS, &[("STEER_ANGLE", 30.0)]).unwrap();
    corrupt[0] ^= 0x40;
    parser.decode_frame(STEER_STATUS, &corrupt, 10);
    let snapshot = parser.query(10);
    assert!(!snapshot.valid);
    assert!((snapshot.value(STEER_STATUS, "STEER_ANGLE").unwrap() + 12.5).abs() < 1e-9);

    let good = packer.encode(STEER_STATUS, &[("STEER_ANGLE", 45.0)]).unwrap();
    parser.decode_frame(STEER_STATUS, &good, 20);
    let snapshot = parser.query(20);
    assert!(snapshot.valid);
    assert!((snapshot.value(STEER_STATUS, "STEER_ANGLE").unwrap() - 45.0).abs() < 1e-9);
}

#[test]
fn test_toyota_and_pedal_frames_validate() {
    let registry = registry();
    let mut packer = CanPacker::new(&registry, "test_vehicle").unwrap();
    let config = ParserConfig::new("test_vehicle")
        .add_message(STEERING_LKA, 10)
        .add_message(GAS_COMMAND, 10)
        .add_signal(STEERING_LKA, "STEER_TORQUE_CMD", 0.0)
        .add_signal(GAS_COMMAND, "ENABLE", 0.0);
    let mut parser = CanParser::from_config(&registry, &config).unwrap();

    for t in 0..5u64 {
        let lka = packer
            .encode(STEERING_LKA, &[("STEER_REQUEST", 1.0), ("STEER_TORQUE_CMD", -300.0)])
            .unwrap();
        let gas = packer.encode(GAS_COMMAND, &[("ENABLE", 1.0)]).unwrap();
        parser.decode_frame(STEERING_LKA, &lka, t * 10);
        parser.decode_frame(GAS_COMMAND, &gas, t * 10);
    }

    let snapshot = parser.query(40);
    assert!(snapshot.valid);
    assert_eq!(snapshot.value(STEERING_LKA, "STEER_TORQUE_CMD"), Some(-300.0));
    assert_eq!(snapshot.value(GAS_COMMAND, "ENABLE"), Some(1.0));
    assert!(parser.stats().iter().all(|s| s.integrity_failures == 0));

    // Flip one payload bit of the Toyota frame
    let mut lka = packer.encode(STEERING_LKA, &[("STEER_REQUEST", 1.0)]).unwrap();
    lka[3] ^= 0x01;
    parser.decode_frame(STEERING_LKA, &lka, 50);
    assert!(!parser.query(50).valid);
}

#[test]
fn test_unsubscribed_addresses_never_appear() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    for t in 0..100 {
        parser.decode_frame(GEARBOX, &[3], t);
        parser.decode_frame(0x7FF, &[1, 2, 3], t);
    }

    let snapshot = parser.query(100);
    assert!(snapshot
        .values
        .iter()
        .all(|v| v.address == WHEEL_SPEEDS));
    assert_eq!(snapshot.values.len(), 1);
    assert_eq!(parser.stats().len(), 1);
}

#[test]
fn test_wrong_size_frame_counts_as_not_seen() {
    let registry = registry();
    let mut parser = speed_parser(&registry);

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(10, 0), 0);
    for t in 1..=20 {
        parser.decode_frame(WHEEL_SPEEDS, &[0xFF; 4], t * 10);
    }

    let snapshot = parser.query(200);
    assert!(!snapshot.valid);
    assert!((snapshot.value(WHEEL_SPEEDS, "SPEED").unwrap() - 0.1).abs() < 1e-9);
    assert_eq!(parser.stats()[0].malformed_frames, 20);
}

#[test]
fn test_bit_isolation() {
    let registry = registry();
    let config = ParserConfig::new("test_vehicle")
        .add_signal(ALL_PLAIN, "A", 0.0)
        .add_signal(ALL_PLAIN, "B", 0.0)
        .add_signal(ALL_PLAIN, "C", 0.0)
        .add_signal(ALL_PLAIN, "D", 0.0);
    let mut parser = CanParser::from_config(&registry, &config).unwrap();

    let base = [0x5A, 0xC3, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF];
    parser.decode_frame(ALL_PLAIN, &base, 0);
    let before = parser.query(0);

    // Rewrite only C (bytes 2-3)
    let mut changed = base;
    changed[2] = 0xFF;
    changed[3] = 0x00;
    parser.decode_frame(ALL_PLAIN, &changed, 1);
    let after = parser.query(1);

    for name in ["A", "B", "D"] {
        assert_eq!(
            before.value(ALL_PLAIN, name),
            after.value(ALL_PLAIN, name),
            "signal {name}"
        );
    }
    assert_ne!(before.value(ALL_PLAIN, "C"), after.value(ALL_PLAIN, "C"));
}

#[test]
fn test_reader_follows_ticks() {
    let registry = registry();
    let mut parser = speed_parser(&registry);
    let reader = parser.reader();

    parser.decode_frame(WHEEL_SPEEDS, &speed_frame(50, 0), 0);
    assert!(reader.latest().values.is_empty());

    parser.tick(5);
    let latest = reader.latest();
    assert!(latest.valid);
    assert_eq!(latest.timestamp, 5);
    assert!((latest.value(WHEEL_SPEEDS, "SPEED").unwrap() - 0.5).abs() < 1e-9);
}
