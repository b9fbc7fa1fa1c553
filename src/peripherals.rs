//! Boundary to the aggregator's own hardware: wired sensors, firmware
//! update check and battery gauge.
//!
//! Conversion of sensor voltages into physical units happens behind this
//! trait. The core only turns what comes back into records.

use crate::mac_address::MacAddress;
use crate::output::{Record, json_body};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

pub const FIRMWARE_VERSION: &str = concat!("V", env!("CARGO_PKG_VERSION"));

/// One converted reading from a wired sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct WiredReading {
    /// Probe type, first topic segment.
    pub sensor: String,
    /// Mounting position such as `0_shallow` or `pH/deep`.
    pub position: String,
    /// Named values in message order.
    pub values: Vec<(String, f64)>,
}

impl WiredReading {
    /// `<sensor>/<position>/<aggregator>` with the aggregator's address
    /// leading the message.
    pub fn to_record(&self, aggregator: MacAddress) -> Result<Record, serde_json::Error> {
        let message = json_body(&WiredMessage {
            mac: aggregator,
            values: &self.values,
        })?;
        Ok(Record::new(
            format!("{}/{}/{aggregator}", self.sensor, self.position),
            message,
        ))
    }
}

struct WiredMessage<'a> {
    mac: MacAddress,
    values: &'a [(String, f64)],
}

impl Serialize for WiredMessage<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("MAC", &self.mac.to_string())?;
        for (key, value) in self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    pub voltage: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    /// Only seen when the platform does not restart on install.
    Installed { version: String },
    Failed(String),
}

/// The aggregator's local hardware.
pub trait Peripherals {
    /// Power the wired sensors, read them and power them down again.
    fn read_wired(&mut self) -> Vec<WiredReading>;

    fn check_firmware_update(&mut self) -> UpdateOutcome;

    /// `None` when no fuel gauge is attached.
    fn battery(&mut self) -> Option<BatteryStatus>;
}

/// Peripherals of a host without wired sensors or a fuel gauge.
#[derive(Debug, Clone, Default)]
pub struct HostPeripherals {
    pub wired: Vec<WiredReading>,
    pub battery: Option<BatteryStatus>,
}

impl Peripherals for HostPeripherals {
    fn read_wired(&mut self) -> Vec<WiredReading> {
        self.wired.clone()
    }

    fn check_firmware_update(&mut self) -> UpdateOutcome {
        UpdateOutcome::UpToDate
    }

    fn battery(&mut self) -> Option<BatteryStatus> {
        self.battery
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Gauge {
    Reading(f64),
    Missing(i8),
}

impl From<Option<f64>> for Gauge {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Gauge::Missing(-1), Gauge::Reading)
    }
}

#[derive(Serialize)]
struct TelemetryMessage {
    #[serde(rename = "MAC")]
    mac: String,
    #[serde(rename = "FIRMWARE_VERSION")]
    firmware_version: &'static str,
    #[serde(rename = "BATT_VOLTAGE")]
    battery_voltage: Gauge,
    #[serde(rename = "BATT_PERCENTAGE")]
    battery_percentage: Gauge,
}

/// Aggregator health record on `datagator/tlm/<aggregator>`. Missing gauge
/// values are reported as `-1`.
pub fn telemetry_record(
    aggregator: MacAddress,
    battery: Option<BatteryStatus>,
) -> Result<Record, serde_json::Error> {
    let message = json_body(&TelemetryMessage {
        mac: aggregator.to_string(),
        firmware_version: FIRMWARE_VERSION,
        battery_voltage: battery.map(|b| b.voltage).into(),
        battery_percentage: battery.map(|b| b.percentage).into(),
    })?;
    Ok(Record::new(format!("datagator/tlm/{aggregator}"), message))
}
