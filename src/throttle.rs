//! Per-device limiting of repeated advertisements.
//!
//! Sensors advertise several times a second while a scan window is open.
//! The throttle lets the first frame of each type from each device through
//! and drops repeats until the interval has passed.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits emits to one per `interval` for every `(device, frame marker)` pair.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_seen: HashMap<(MacAddress, u8), Instant>,
}

impl Throttle {
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use datagator::throttle::Throttle;
    ///
    /// let throttle = Throttle::new(Duration::from_secs(10));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_seen: HashMap::new(),
        }
    }

    /// Returns `true` and restarts the device's timer if the frame should be
    /// emitted. A blocked frame leaves the timer untouched.
    pub fn should_emit(&mut self, address: MacAddress, marker: u8) -> bool {
        self.should_emit_at(address, marker, Instant::now())
    }

    fn should_emit_at(&mut self, address: MacAddress, marker: u8, now: Instant) -> bool {
        match self.last_seen.get(&(address, marker)) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_seen.insert((address, marker), now);
                true
            }
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use datagator::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("64").unwrap(), Duration::from_secs(64));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let number = |num: &str, unit: &str| -> Result<u64, String> {
        num.trim()
            .parse()
            .map_err(|_| format!("invalid {unit}: {num}"))
    };

    if let Some(num) = src.strip_suffix("ms") {
        return Ok(Duration::from_millis(number(num, "milliseconds")?));
    }
    if let Some(num) = src.strip_suffix('h') {
        return Ok(Duration::from_secs(number(num, "hours")? * 3600));
    }
    if let Some(num) = src.strip_suffix('m') {
        return Ok(Duration::from_secs(number(num, "minutes")? * 60));
    }
    if let Some(num) = src.strip_suffix('s') {
        return Ok(Duration::from_secs(number(num, "seconds")?));
    }

    Ok(Duration::from_secs(number(src, "duration")?))
}
