//! CAN Codec CLI Application
//!
//! Command-line front end for the can-codec library:
//! - `decode` replays candump logs through a frame parser and prints the
//!   snapshots a control loop would have seen
//! - `pack` encodes a message, filling in counter and checksum
//! - `info` summarizes a database file

use anyhow::{Context, Result};
use can_codec::{CanPacker, CanParser, PackRequest, ParserConfig, Registry, Snapshot};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

mod candump;
mod config;

/// CAN Codec - Decode and encode CAN frames against vehicle databases
#[derive(Parser, Debug)]
#[command(name = "can-codec")]
#[command(about = "Decode and encode CAN frames against vehicle databases", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay candump logs through a parser and print snapshots as JSON lines
    Decode {
        /// Database JSON file(s) (can be repeated)
        #[arg(short, long, value_name = "FILE", required = true)]
        database: Vec<PathBuf>,

        /// Parser configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Snapshot interval in milliseconds
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,

        /// candump log file(s), replayed in parallel
        #[arg(value_name = "LOG", required = true)]
        logs: Vec<PathBuf>,
    },

    /// Encode one message and print it in candump format
    Pack {
        /// Database JSON file
        #[arg(short, long, value_name = "FILE")]
        database: PathBuf,

        /// CAN ID in hex, e.g. 1A0 or 0x1A0
        #[arg(value_parser = parse_address)]
        address: u32,

        /// Signal values as NAME=VALUE
        #[arg(value_parser = parse_assignment)]
        values: Vec<(String, f64)>,

        /// Number of consecutive frames to produce
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Counter value for the first frame
        #[arg(long)]
        counter: Option<u8>,
    },

    /// Print a summary of a database file
    Info {
        /// Database JSON file
        #[arg(value_name = "FILE")]
        database: PathBuf,
    },
}

/// One output line of `decode`
#[derive(Serialize)]
struct SnapshotLine<'a> {
    log: &'a Path,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Codec CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using codec library v{}", can_codec::VERSION);

    match &args.command {
        Command::Decode {
            database,
            config,
            interval,
            logs,
        } => decode_mode(database, config, *interval, logs),
        Command::Pack {
            database,
            address,
            values,
            count,
            counter,
        } => pack_mode(database, *address, values, *count, *counter),
        Command::Info { database } => info_mode(database),
    }
}

/// Replay every log with its own parser and print the snapshots
fn decode_mode(
    databases: &[PathBuf],
    config_path: &Path,
    interval: u64,
    logs: &[PathBuf],
) -> Result<()> {
    let registry = Registry::new();
    for path in databases {
        registry.register(config::load_database(path)?)?;
    }
    let parser_config = config::load_config(config_path)?;
    log::info!(
        "Replaying {} log(s) against {} on bus {}",
        logs.len(),
        parser_config.database,
        parser_config.bus
    );

    let results: Vec<Result<Vec<Snapshot>>> = logs
        .par_iter()
        .map(|log| replay(&registry, &parser_config, log, interval))
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (log, result) in logs.iter().zip(results) {
        let snapshots = result.with_context(|| format!("Failed to replay {:?}", log))?;
        let invalid = snapshots.iter().filter(|s| !s.valid).count();
        log::info!(
            "{:?}: {} snapshots, {} invalid",
            log,
            snapshots.len(),
            invalid
        );
        for snapshot in &snapshots {
            let line = SnapshotLine { log, snapshot };
            serde_json::to_writer(&mut out, &line)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Feed one log through a fresh parser, ticking every `interval` ms
fn replay(
    registry: &Registry,
    parser_config: &ParserConfig,
    log: &Path,
    interval: u64,
) -> Result<Vec<Snapshot>> {
    let frames = candump::read_log(log)?;
    let Some(first) = frames.first() else {
        log::warn!("{:?} contains no frames", log);
        return Ok(Vec::new());
    };

    let mut parser = CanParser::from_config(registry, parser_config)?.started_at(first.timestamp);
    let mut next_tick = first.timestamp.saturating_add(interval);
    let mut snapshots = Vec::new();

    for frame in &frames {
        while frame.timestamp >= next_tick {
            snapshots.push(parser.tick(next_tick));
            next_tick += interval;
        }
        parser.decode_frames(std::iter::once(frame));
    }
    if let Some(last) = frames.last() {
        snapshots.push(parser.tick(last.timestamp));
    }

    for stats in parser.stats() {
        if stats.integrity_failures > 0 || stats.malformed_frames > 0 {
            log::warn!(
                "{:?}: 0x{:X} had {} integrity failures and {} malformed frames out of {}",
                log,
                stats.address,
                stats.integrity_failures,
                stats.malformed_frames,
                stats.frames_seen
            );
        }
    }
    Ok(snapshots)
}

/// Encode `count` frames and print them as candump payloads
fn pack_mode(
    database_path: &Path,
    address: u32,
    values: &[(String, f64)],
    count: usize,
    counter: Option<u8>,
) -> Result<()> {
    let registry = Registry::new();
    let database = registry.register(config::load_database(database_path)?)?;
    let mut packer = CanPacker::new(&registry, database.name())?;

    let mut request = PackRequest::new(address);
    for (name, value) in values {
        request = request.with_value(name.as_str(), *value);
    }
    if let Some(counter) = counter {
        request = request.with_counter(counter);
    }

    for _ in 0..count {
        let data = packer.encode_request(&request)?;
        println!("{:03X}#{}", address, to_hex(&data));
        // Only the first frame takes the override, later ones follow on
        request.counter = None;
    }
    Ok(())
}

fn info_mode(database_path: &Path) -> Result<()> {
    let database = config::load_database(database_path)?;
    database.validate()?;

    let stats = database.stats();
    println!("Database: {}", database.name());
    println!("  Messages:     {}", stats.num_messages);
    println!("  Signals:      {}", stats.num_signals);
    println!("  Value tables: {}", stats.num_value_defs);
    for message in database.messages() {
        let integrity = match (message.checksum_signal(), message.counter_signal()) {
            (Some(checksum), Some(counter)) => {
                format!(" [{:?}, {:?}]", checksum.role, counter.role)
            }
            (Some(checksum), None) => format!(" [{:?}]", checksum.role),
            (None, Some(counter)) => format!(" [{:?}]", counter.role),
            (None, None) => String::new(),
        };
        println!(
            "  0x{:03X} {} ({} bytes, {} signals){}",
            message.address,
            message.name,
            message.size,
            message.signals.len(),
            integrity
        );
    }
    Ok(())
}

fn parse_address(s: &str) -> std::result::Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid CAN ID {:?}: {}", s, e))
}

fn parse_assignment(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {}: {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
