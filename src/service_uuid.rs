//! Normalized Bluetooth service UUIDs.
//!
//! Radio stacks report service UUIDs as 16-bit short forms, `0x` prefixed
//! hex, or full dashed 128-bit strings in either case. Everything is widened
//! onto the Bluetooth base UUID so that comparison is a plain integer match.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// `0000xxxx-0000-1000-8000-00805f9b34fb` with the short slot zeroed.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// A 128-bit service UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceUuid(pub u128);

impl ServiceUuid {
    /// Widen an assigned 16-bit UUID onto the Bluetooth base UUID.
    pub const fn from_u16(short: u16) -> Self {
        Self::from_u32(short as u32)
    }

    /// Widen an assigned 32-bit UUID onto the Bluetooth base UUID.
    pub const fn from_u32(short: u32) -> Self {
        Self(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
    }

    /// The 16-bit short form, if this UUID sits on the Bluetooth base.
    pub fn as_u16(&self) -> Option<u16> {
        let short = self.0 >> 96;
        let is_base = self.0 & ((1u128 << 96) - 1) == BLUETOOTH_BASE_UUID;
        (is_base && short <= u128::from(u16::MAX)).then_some(short as u16)
    }
}

impl fmt::Display for ServiceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

/// Errors returned when parsing a service UUID string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseUuidError {
    #[error("invalid service UUID: expected 4, 8 or 32 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid service UUID: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for ServiceUuid {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let digits: String = body.chars().filter(|c| *c != '-').collect();

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseUuidError::InvalidHex(s.to_string()));
        }

        let invalid_hex = |_| ParseUuidError::InvalidHex(s.to_string());
        match digits.len() {
            4 => u16::from_str_radix(&digits, 16)
                .map(ServiceUuid::from_u16)
                .map_err(invalid_hex),
            8 => u32::from_str_radix(&digits, 16)
                .map(ServiceUuid::from_u32)
                .map_err(invalid_hex),
            32 => u128::from_str_radix(&digits, 16)
                .map(ServiceUuid)
                .map_err(invalid_hex),
            n => Err(ParseUuidError::InvalidLength(n)),
        }
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Uuid> for ServiceUuid {
    fn from(uuid: bluer::Uuid) -> Self {
        Self(uuid.as_u128())
    }
}
