// Shared fixture: a small multi-vendor database

#![allow(dead_code)]

use can_codec::{Database, MessageDef, Registry, SignalDef, SignalRole, ValueDef};

pub const WHEEL_SPEEDS: u32 = 0x1A0;
pub const STEER_STATUS: u32 = 0x1A6;
pub const GEARBOX: u32 = 0x1A5;
pub const STEERING_LKA: u32 = 0x2E4;
pub const GAS_COMMAND: u32 = 0x200;
pub const ALL_PLAIN: u32 = 0x300;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn database() -> Database {
    let wheel_speeds = MessageDef::new(
        "WHEEL_SPEEDS",
        WHEEL_SPEEDS,
        8,
        vec![
            SignalDef::new("SPEED", 0, 8).scaled(0.01, 0.0),
            SignalDef::new("COUNTER", 8, 4).with_role(SignalRole::PedalCounter),
        ],
    );

    let steer_status = MessageDef::new(
        "STEER_STATUS",
        STEER_STATUS,
        8,
        vec![
            SignalDef::new("STEER_ANGLE", 7, 16).big_endian().signed().scaled(0.1, 0.0),
            SignalDef::new("STEER_RATE", 23, 16).big_endian().signed(),
            SignalDef::new("COUNTER", 61, 2)
                .big_endian()
                .with_role(SignalRole::HondaCounter),
            SignalDef::new("CHECKSUM", 59, 4)
                .big_endian()
                .with_role(SignalRole::HondaChecksum),
        ],
    );

    let gearbox = MessageDef::new(
        "GEARBOX",
        GEARBOX,
        1,
        vec![SignalDef::new("GEAR", 0, 4)],
    );

    let steering_lka = MessageDef::new(
        "STEERING_LKA",
        STEERING_LKA,
        5,
        vec![
            SignalDef::new("STEER_REQUEST", 0, 1).big_endian(),
            SignalDef::new("STEER_TORQUE_CMD", 15, 16).big_endian().signed(),
            SignalDef::new("LKA_STATE", 31, 8).big_endian(),
            SignalDef::new("CHECKSUM", 39, 8)
                .big_endian()
                .with_role(SignalRole::ToyotaChecksum),
        ],
    );

    let gas_command = MessageDef::new(
        "GAS_COMMAND",
        GAS_COMMAND,
        6,
        vec![
            SignalDef::new("GAS_COMMAND", 7, 16)
                .big_endian()
                .scaled(0.253984064, -83.3),
            SignalDef::new("GAS_COMMAND2", 23, 16)
                .big_endian()
                .scaled(0.126992032, -83.3),
            SignalDef::new("ENABLE", 39, 1).big_endian(),
            SignalDef::new("COUNTER_PEDAL", 35, 4)
                .big_endian()
                .with_role(SignalRole::PedalCounter),
            SignalDef::new("CHECKSUM_PEDAL", 47, 8)
                .big_endian()
                .with_role(SignalRole::PedalChecksum),
        ],
    );

    let all_plain = MessageDef::new(
        "ALL_PLAIN",
        ALL_PLAIN,
        8,
        vec![
            SignalDef::new("A", 0, 12).signed().scaled(0.5, -3.0),
            SignalDef::new("B", 12, 4),
            SignalDef::new("C", 23, 16).big_endian().scaled(0.1, 40.0),
            SignalDef::new("D", 32, 32),
        ],
    );

    Database::new(
        "test_vehicle",
        vec![
            wheel_speeds,
            steer_status,
            gearbox,
            steering_lka,
            gas_command,
            all_plain,
        ],
        vec![ValueDef::new("GEAR", GEARBOX, "0 P 1 R 2 N 3 D")],
    )
}

pub fn registry() -> Registry {
    init_logging();
    let registry = Registry::new();
    registry.register(database()).expect("fixture database is valid");
    registry
}

/// Deterministic pseudo-random payloads
pub fn payloads(count: usize, len: usize) -> Vec<Vec<u8>> {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    (0..count)
        .map(|_| {
            (0..len)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 56) as u8
                })
                .collect()
        })
        .collect()
}
