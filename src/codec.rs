//! Binary advertisement frame decoding.
//!
//! All multi-byte fields are big-endian on the wire. Fields are read at
//! explicit offsets after the frame length has been checked against the
//! layout, so a decoder never looks past the end of the payload and never
//! relies on struct layout.

use crate::family::{FrameLayout, LayoutKind, SensorFamily};
use crate::mac_address::MacAddress;
use crate::reading::DecodedReading;
use log::debug;
use thiserror::Error;

/// Error types for decoding advertisement frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The marker is known but the frame length matches none of its layouts
    #[error("Size mismatch: frame 0x{marker:02x} is {actual} bytes")]
    SizeMismatch { marker: u8, actual: usize },
    /// The family has no layout for this marker
    #[error("Unknown marker 0x{0:02x}")]
    UnknownMarker(u8),
    /// The frame decoded cleanly but carried no measurement
    #[error("Empty reading from frame 0x{marker:02x}")]
    EmptyReading { marker: u8 },
}

/// Eddystone TLM uses this temperature value for "not supported".
const TLM_TEMPERATURE_UNSUPPORTED: i16 = i16::MIN;

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn mac_reversed(buf: &[u8], at: usize) -> MacAddress {
    let mut bytes = [0u8; 6];
    bytes.copy_from_slice(&buf[at..at + 6]);
    MacAddress::from_reversed(bytes)
}

/// Signed 8.8 fixed point.
fn fixed_8_8(raw: i16) -> f64 {
    f64::from(raw) / 256.0
}

/// Unsigned 8.8 fixed point.
fn ufixed_8_8(raw: u16) -> f64 {
    f64::from(raw) / 256.0
}

/// KKM integer/fraction pair. The fraction byte is read as a decimal
/// fraction whose scale depends on its magnitude.
fn split_decimal(integer: i8, fraction: u8) -> f64 {
    let divisor = if fraction >= 99 {
        1000.0
    } else if fraction >= 9 {
        100.0
    } else {
        10.0
    };
    f64::from(integer) + f64::from(fraction) / divisor
}

/// Pick the layout for `marker` whose length matches `payload`.
pub fn select_layout(
    family: SensorFamily,
    marker: u8,
    payload: &[u8],
) -> Result<&'static FrameLayout, DecodeError> {
    let profile = family
        .profile()
        .ok_or(DecodeError::UnknownMarker(marker))?;

    let mut candidates = profile.layouts_for(marker).peekable();
    if candidates.peek().is_none() {
        return Err(DecodeError::UnknownMarker(marker));
    }
    candidates
        .find(|layout| layout.len == payload.len())
        .ok_or(DecodeError::SizeMismatch {
            marker,
            actual: payload.len(),
        })
}

/// Decode one frame.
///
/// `payload` is the complete service data for the frame, with `marker` as
/// its first byte.
pub fn decode(
    family: SensorFamily,
    address: MacAddress,
    marker: u8,
    payload: &[u8],
) -> Result<DecodedReading, DecodeError> {
    let layout = select_layout(family, marker, payload)?;

    match layout.kind {
        LayoutKind::MinewHt => {
            // [marker][version][battery %][temp i16][humidity u16][mac x6]
            let embedded = mac_reversed(payload, 7);
            if embedded != address {
                debug!("HT frame from {address} embeds address {embedded}");
            }
            DecodedReading::new(
                family,
                address,
                marker,
                Some(fixed_8_8(be_i16(payload, 3))),
                Some(ufixed_8_8(be_u16(payload, 5))),
                None,
            )
        }
        LayoutKind::MinewInfo => {
            // [marker][version][battery %][mac x6][name x2]
            debug!(
                "INFO frame from {address}: device {}, name {:?}",
                mac_reversed(payload, 3),
                String::from_utf8_lossy(&payload[9..11])
            );
            Err(DecodeError::EmptyReading { marker })
        }
        LayoutKind::EddystoneTlm => {
            // [marker][version][battery mV][temp i16][adv count u32][uptime u32]
            let millivolts = be_u16(payload, 2);
            let raw_temperature = be_i16(payload, 4);
            debug!(
                "TLM frame from {address}: {} advertisements, up {} s",
                be_u32(payload, 6),
                be_u32(payload, 10) / 10
            );
            DecodedReading::new(
                family,
                address,
                marker,
                (raw_temperature != TLM_TEMPERATURE_UNSUPPORTED)
                    .then(|| fixed_8_8(raw_temperature)),
                None,
                (millivolts != 0).then_some(millivolts),
            )
        }
        LayoutKind::KkmSensor => {
            // [marker][version][sensor mask][battery mV][temp][humidity][acc x/y/z]
            let temperature = split_decimal(payload[5] as i8, payload[6]);
            let humidity = split_decimal(payload[7] as i8, payload[8]);
            DecodedReading::new(
                family,
                address,
                marker,
                Some(temperature),
                Some(humidity),
                Some(be_u16(payload, 3)),
            )
        }
    }
}
