//! Normalized sensor readings.

use crate::codec::DecodeError;
use crate::family::SensorFamily;
use crate::mac_address::MacAddress;
use crate::output::{Record, json_body};
use serde::Serialize;

/// A reading decoded from one advertisement frame.
///
/// Units:
/// - Temperature in Celsius
/// - Humidity in percent relative humidity
/// - Battery in millivolts
///
/// At least one of the measurement fields is always populated; frames that
/// would produce an empty reading fail to decode instead.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    pub family: SensorFamily,
    /// Radio address of the advertiser
    pub address: MacAddress,
    /// Frame type marker the values were decoded from
    pub marker: u8,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery_mv: Option<u16>,
}

/// Key order here is the order in the emitted message.
#[derive(Serialize)]
struct ReadingMessage<'a> {
    #[serde(rename = "MAC")]
    mac: String,
    #[serde(rename = "TEMP", skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "HUMIDITY", skip_serializing_if = "Option::is_none")]
    humidity: Option<f64>,
    #[serde(rename = "BATT_VOLTAGE", skip_serializing_if = "Option::is_none")]
    battery_mv: Option<u16>,
    #[serde(rename = "SENSOR_NAME")]
    sensor_name: &'a str,
    #[serde(rename = "GATOR_MAC")]
    aggregator: String,
}

impl DecodedReading {
    pub(crate) fn new(
        family: SensorFamily,
        address: MacAddress,
        marker: u8,
        temperature: Option<f64>,
        humidity: Option<f64>,
        battery_mv: Option<u16>,
    ) -> Result<Self, DecodeError> {
        if temperature.is_none() && humidity.is_none() && battery_mv.is_none() {
            return Err(DecodeError::EmptyReading { marker });
        }
        Ok(Self {
            family,
            address,
            marker,
            temperature,
            humidity,
            battery_mv,
        })
    }

    /// `<family>/<address>`
    pub fn topic(&self) -> String {
        format!("{}/{}", self.family.slug(), self.address)
    }

    /// Minified JSON object body (no braces) with a fixed key order. The
    /// logger that heard the frame is named last.
    pub fn message(&self, aggregator: MacAddress) -> Result<String, serde_json::Error> {
        json_body(&ReadingMessage {
            mac: self.address.to_string(),
            temperature: self.temperature,
            humidity: self.humidity,
            battery_mv: self.battery_mv,
            sensor_name: self.family.display_name(),
            aggregator: aggregator.to_string(),
        })
    }

    pub fn to_record(&self, aggregator: MacAddress) -> Result<Record, serde_json::Error> {
        Ok(Record::new(self.topic(), self.message(aggregator)?))
    }
}
