//! Known sensor families and their frame layouts.
//!
//! Family logic holds no per-device state, so each family is described by a
//! static [`FamilyProfile`] in [`REGISTRY`]. Registry order is the
//! classification tie-break order.

use crate::service_uuid::ServiceUuid;
use std::fmt;

/// A recognized sensor product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorFamily {
    MinewS1,
    KkmK6p,
    Unknown,
}

impl SensorFamily {
    /// Static description of this family. `Unknown` has none.
    pub fn profile(self) -> Option<&'static FamilyProfile> {
        REGISTRY.iter().find(|p| p.family == self)
    }

    /// Topic prefix, e.g. `minew_s1`.
    pub fn slug(self) -> &'static str {
        self.profile().map_or("unknown", |p| p.slug)
    }

    /// Human-readable product name, e.g. `Minew S1`.
    pub fn display_name(self) -> &'static str {
        self.profile().map_or("Unknown", |p| p.display_name)
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Which decoder handles a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Minew temperature/humidity frame, 8.8 fixed point.
    MinewHt,
    /// Minew device info frame. Carries no measurements.
    MinewInfo,
    /// Eddystone unencrypted TLM frame.
    EddystoneTlm,
    /// KKM KSensor frame with integer/fraction byte pairs.
    KkmSensor,
}

/// A frame type marker together with its exact wire length, marker byte
/// included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub marker: u8,
    pub len: usize,
    pub kind: LayoutKind,
}

/// Everything the classifier and codec need to know about one family.
#[derive(Debug)]
pub struct FamilyProfile {
    pub family: SensorFamily,
    pub slug: &'static str,
    pub display_name: &'static str,
    /// Service UUIDs this family advertises data under.
    pub service_uuids: &'static [ServiceUuid],
    /// Local name prefix that identifies the family regardless of payload.
    pub name_prefix: Option<&'static str>,
    /// Decodable frame layouts. One marker may have several lengths.
    pub layouts: &'static [FrameLayout],
    /// Markers that are recognized but carry nothing worth logging.
    pub ignored_markers: &'static [u8],
}

impl FamilyProfile {
    pub fn claims_uuid(&self, uuid: &ServiceUuid) -> bool {
        self.service_uuids.contains(uuid)
    }

    pub fn claims_name(&self, name: &str) -> bool {
        self.name_prefix.is_some_and(|prefix| name.starts_with(prefix))
    }

    pub fn layouts_for(&self, marker: u8) -> impl Iterator<Item = &'static FrameLayout> {
        self.layouts.iter().filter(move |l| l.marker == marker)
    }

    pub fn ignores(&self, marker: u8) -> bool {
        self.ignored_markers.contains(&marker)
    }
}

pub const MINEW_HT: FrameLayout = FrameLayout {
    marker: 0xA1,
    len: 13,
    kind: LayoutKind::MinewHt,
};

pub const MINEW_INFO: FrameLayout = FrameLayout {
    marker: 0xA1,
    len: 11,
    kind: LayoutKind::MinewInfo,
};

pub const EDDYSTONE_TLM: FrameLayout = FrameLayout {
    marker: 0x20,
    len: 14,
    kind: LayoutKind::EddystoneTlm,
};

pub const KKM_SENSOR: FrameLayout = FrameLayout {
    marker: 0x21,
    len: 15,
    kind: LayoutKind::KkmSensor,
};

/// Eddystone URL frame marker.
pub const EDDYSTONE_URL_MARKER: u8 = 0x10;

pub static REGISTRY: [FamilyProfile; 2] = [
    FamilyProfile {
        family: SensorFamily::MinewS1,
        slug: "minew_s1",
        display_name: "Minew S1",
        service_uuids: &[
            ServiceUuid::from_u16(0xFFE1), // HT / INFO
            ServiceUuid::from_u16(0xFFF1), // Eddystone URL
            ServiceUuid::from_u16(0xFEAA), // Eddystone TLM
        ],
        name_prefix: None,
        layouts: &[MINEW_HT, MINEW_INFO, EDDYSTONE_TLM],
        ignored_markers: &[EDDYSTONE_URL_MARKER],
    },
    FamilyProfile {
        family: SensorFamily::KkmK6p,
        slug: "kkm_k6p",
        display_name: "KKM K6P",
        service_uuids: &[],
        name_prefix: Some("KBPro"),
        layouts: &[KKM_SENSOR],
        ignored_markers: &[EDDYSTONE_URL_MARKER, EDDYSTONE_TLM.marker],
    },
];
