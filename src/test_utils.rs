use crate::frame::AdvertisementFrame;
use crate::mac_address::MacAddress;
use crate::service_uuid::ServiceUuid;

/// A stable address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Address of the logger itself in unit tests.
pub const GATOR_MAC: MacAddress = MacAddress([0x24, 0x0A, 0xC4, 0x00, 0x00, 0x01]);

fn reversed_test_mac() -> [u8; 6] {
    let mut bytes = TEST_MAC.0;
    bytes.reverse();
    bytes
}

/// Minew HT frame with raw big-endian 8.8 temperature and humidity words.
pub fn minew_ht_payload(temperature: u16, humidity: u16) -> Vec<u8> {
    let mut payload = vec![0xA1, 0x01, 0x64];
    payload.extend_from_slice(&temperature.to_be_bytes());
    payload.extend_from_slice(&humidity.to_be_bytes());
    payload.extend_from_slice(&reversed_test_mac());
    payload
}

pub fn minew_info_payload() -> Vec<u8> {
    let mut payload = vec![0xA1, 0x08, 0x64];
    payload.extend_from_slice(&reversed_test_mac());
    payload.extend_from_slice(b"S1");
    payload
}

/// Eddystone TLM frame with battery millivolts and raw 8.8 temperature.
pub fn tlm_payload(millivolts: u16, temperature: u16) -> Vec<u8> {
    let mut payload = vec![0x20, 0x00];
    payload.extend_from_slice(&millivolts.to_be_bytes());
    payload.extend_from_slice(&temperature.to_be_bytes());
    payload.extend_from_slice(&1200u32.to_be_bytes());
    payload.extend_from_slice(&36_000u32.to_be_bytes());
    payload
}

/// KKM KSensor frame with `(integer, fraction)` temperature and humidity.
pub fn kkm_sensor_payload(millivolts: u16, temperature: (i8, u8), humidity: (i8, u8)) -> Vec<u8> {
    let mut payload = vec![0x21, 0x00, 0x0F];
    payload.extend_from_slice(&millivolts.to_be_bytes());
    payload.extend_from_slice(&[temperature.0 as u8, temperature.1]);
    payload.extend_from_slice(&[humidity.0 as u8, humidity.1]);
    payload.extend_from_slice(&[0x00, 0x10, 0xFF, 0xF0, 0x03, 0xE8]);
    payload
}

/// HT frame advertised by a Minew S1 under its HT service UUID.
pub fn minew_ht_frame(temperature: u16, humidity: u16) -> AdvertisementFrame {
    AdvertisementFrame::service_data(
        TEST_MAC,
        ServiceUuid::from_u16(0xFFE1),
        minew_ht_payload(temperature, humidity),
    )
}

/// KSensor frame advertised by a KKM K6P under the Eddystone UUID.
pub fn kkm_frame(millivolts: u16) -> AdvertisementFrame {
    AdvertisementFrame::service_data(
        TEST_MAC,
        ServiceUuid::from_u16(0xFEAA),
        kkm_sensor_payload(millivolts, (23, 45), (51, 5)),
    )
    .with_name("KBPro_0A1B2C")
}
