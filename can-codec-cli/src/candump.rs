//! candump log reading
//!
//! Accepts the `candump -l` format: `(1436509052.249713) can0 1A0#6400000000000000`.

use anyhow::{bail, Context, Result};
use can_codec::{CanFrame, Timestamp};
use std::fs;
use std::path::Path;

/// Parse one log line
///
/// Returns `Ok(None)` for blank lines, comments and remote frames.
pub fn parse_candump_line(line: &str) -> Result<Option<CanFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(stamp), Some(iface), Some(body)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected '(timestamp) interface ID#DATA', got {:?}", line);
    };

    let timestamp = parse_timestamp(stamp)?;
    let bus = parse_bus(iface)?;

    let Some((id, data)) = body.split_once('#') else {
        bail!("missing '#' separator in {:?}", body);
    };
    let address = u32::from_str_radix(id, 16).with_context(|| format!("bad CAN ID {:?}", id))?;

    if data.starts_with('R') {
        return Ok(None);
    }
    // CAN FD frames carry a flags nibble after a second '#'
    let data = match data.strip_prefix('#') {
        Some(fd) => fd.get(1..).unwrap_or_default(),
        None => data,
    };

    Ok(Some(CanFrame::new(bus, address, parse_hex(data)?, timestamp)))
}

/// Read every frame in a log file, in file order
pub fn read_log(path: &Path) -> Result<Vec<CanFrame>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read log file: {:?}", path))?;

    let mut frames = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let frame = parse_candump_line(line)
            .with_context(|| format!("{:?} line {}", path, index + 1))?;
        frames.extend(frame);
    }
    log::debug!("Read {} frames from {:?}", frames.len(), path);
    Ok(frames)
}

/// `(seconds.fraction)` to milliseconds
fn parse_timestamp(stamp: &str) -> Result<Timestamp> {
    let inner = stamp
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .with_context(|| format!("timestamp not in parentheses: {:?}", stamp))?;
    let seconds: f64 = inner
        .parse()
        .with_context(|| format!("bad timestamp {:?}", inner))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("bad timestamp {:?}", inner);
    }
    Ok((seconds * 1000.0).round() as Timestamp)
}

/// Bus number from the trailing digits of the interface name, 0 if none
fn parse_bus(iface: &str) -> Result<u8> {
    let name = iface.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &iface[name.len()..];
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .with_context(|| format!("bus number of interface {:?} out of range", iface))
}

fn parse_hex(data: &str) -> Result<Vec<u8>> {
    let data = data.replace('.', "");
    if !data.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("non-hex payload {:?}", data);
    }
    if data.len() % 2 != 0 {
        bail!("odd number of hex digits in {:?}", data);
    }
    Ok(data
        .as_bytes()
        .chunks(2)
        .map(|pair| (hex_digit(pair[0]) << 4) | hex_digit(pair[1]))
        .collect())
}

fn hex_digit(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b.to_ascii_uppercase() - b'A' + 10,
    }
}
