//! Raw advertisement frames as delivered by the radio stack.

use crate::mac_address::MacAddress;
use crate::service_uuid::ServiceUuid;

/// The data portion of a single advertisement.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvertisementPayload {
    /// Service data keyed by the advertised service UUID.
    ServiceData { uuid: ServiceUuid, data: Vec<u8> },
    /// Manufacturer specific data keyed by the Bluetooth SIG company id.
    ManufacturerData { company_id: u16, data: Vec<u8> },
    /// Neither service nor manufacturer data was present.
    Empty,
}

/// Coarse tag describing which kind of payload an advertisement carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementKind {
    ServiceUuid,
    ManufacturerData,
    None,
}

/// One advertisement event.
///
/// Frames are created per radio event, classified, and dropped. Nothing in
/// the crate mutates a frame once it has been built.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementFrame {
    pub address: MacAddress,
    /// Complete or shortened local name, when the advertiser sent one.
    pub local_name: Option<String>,
    pub payload: AdvertisementPayload,
}

impl AdvertisementFrame {
    pub fn service_data(address: MacAddress, uuid: ServiceUuid, data: Vec<u8>) -> Self {
        Self {
            address,
            local_name: None,
            payload: AdvertisementPayload::ServiceData { uuid, data },
        }
    }

    pub fn manufacturer_data(address: MacAddress, company_id: u16, data: Vec<u8>) -> Self {
        Self {
            address,
            local_name: None,
            payload: AdvertisementPayload::ManufacturerData { company_id, data },
        }
    }

    pub fn empty(address: MacAddress) -> Self {
        Self {
            address,
            local_name: None,
            payload: AdvertisementPayload::Empty,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn kind(&self) -> AdvertisementKind {
        match self.payload {
            AdvertisementPayload::ServiceData { .. } => AdvertisementKind::ServiceUuid,
            AdvertisementPayload::ManufacturerData { .. } => AdvertisementKind::ManufacturerData,
            AdvertisementPayload::Empty => AdvertisementKind::None,
        }
    }

    pub fn service_uuid(&self) -> Option<ServiceUuid> {
        match self.payload {
            AdvertisementPayload::ServiceData { uuid, .. } => Some(uuid),
            _ => None,
        }
    }

    /// Service data bytes, if this frame carries any.
    pub fn service_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            AdvertisementPayload::ServiceData { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;

    #[test]
    fn kind_follows_payload() {
        let uuid = ServiceUuid::from_u16(0xFFE1);
        let frame = AdvertisementFrame::service_data(TEST_MAC, uuid, vec![0xA1]);
        assert_eq!(frame.kind(), AdvertisementKind::ServiceUuid);
        assert_eq!(frame.service_uuid(), Some(uuid));
        assert_eq!(frame.service_bytes(), Some(&[0xA1][..]));

        let frame = AdvertisementFrame::manufacturer_data(TEST_MAC, 0x004C, vec![0x02, 0x15]);
        assert_eq!(frame.kind(), AdvertisementKind::ManufacturerData);
        assert_eq!(frame.service_uuid(), None);
        assert_eq!(frame.service_bytes(), None);

        assert_eq!(
            AdvertisementFrame::empty(TEST_MAC).kind(),
            AdvertisementKind::None
        );
    }

    #[test]
    fn with_name_sets_local_name() {
        let frame = AdvertisementFrame::empty(TEST_MAC).with_name("KBPro_1234");
        assert_eq!(frame.local_name.as_deref(), Some("KBPro_1234"));
    }
}
