//! Sensor family classification.
//!
//! Classification is a pure function of the frame. A local name that starts
//! with a family's name prefix is the most specific signature and is checked
//! first, because KKM devices advertise under the same Eddystone service UUID
//! as Minew TLM frames. Otherwise the advertised service UUID is matched
//! against each family's UUID set in registry order.

use crate::family::{REGISTRY, SensorFamily};
use crate::frame::AdvertisementFrame;

/// Determine which known family, if any, produced `frame`.
pub fn classify(frame: &AdvertisementFrame) -> SensorFamily {
    if let Some(name) = frame.local_name.as_deref()
        && let Some(profile) = REGISTRY.iter().find(|p| p.claims_name(name))
    {
        return profile.family;
    }

    frame
        .service_uuid()
        .and_then(|uuid| REGISTRY.iter().find(|p| p.claims_uuid(&uuid)))
        .map_or(SensorFamily::Unknown, |p| p.family)
}
