//! Advertisement ingestion: classify, decode, serialize.
//!
//! Ingestion runs inside the radio scan callback, so it never blocks and
//! never fails loudly. Malformed or foreign frames are expected and are
//! dropped with a debug log line.

use crate::classifier::classify;
use crate::codec::{self, DecodeError};
use crate::family::SensorFamily;
use crate::frame::AdvertisementFrame;
use crate::mac_address::MacAddress;
use crate::output::Record;
use crate::reading::DecodedReading;
use crate::throttle::Throttle;
use log::debug;
use std::time::Duration;

/// Why a frame produced no reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Skipped {
    /// No known family matched the frame.
    Unrecognized,
    /// Known family, but the frame carries no service data to decode.
    NoServiceData,
    /// Recognized marker that never carries measurements.
    IgnoredMarker(u8),
    Decode(DecodeError),
}

/// Classify and decode a frame into a reading.
pub fn decode_frame(frame: &AdvertisementFrame) -> Result<DecodedReading, Skipped> {
    let family = classify(frame);
    let profile = family.profile().ok_or(Skipped::Unrecognized)?;

    let data = frame.service_bytes().ok_or(Skipped::NoServiceData)?;
    let Some(&marker) = data.first() else {
        return Err(Skipped::Decode(DecodeError::SizeMismatch {
            marker: 0,
            actual: 0,
        }));
    };
    if profile.ignores(marker) {
        return Err(Skipped::IgnoredMarker(marker));
    }

    codec::decode(family, frame.address, marker, data).map_err(Skipped::Decode)
}

/// Turn one advertisement heard by `aggregator` into a `(topic, message)`
/// record, or nothing.
pub fn ingest(frame: &AdvertisementFrame, aggregator: MacAddress) -> Option<Record> {
    match decode_frame(frame) {
        Ok(reading) => match reading.to_record(aggregator) {
            Ok(record) => Some(record),
            Err(error) => {
                debug!("dropping reading from {}: {error}", frame.address);
                None
            }
        },
        Err(reason) => {
            log_skipped(frame, &reason);
            None
        }
    }
}

fn log_skipped(frame: &AdvertisementFrame, reason: &Skipped) {
    // Foreign devices are the common case; logging them would drown the rest.
    if *reason != Skipped::Unrecognized {
        debug!(
            "dropping {} frame from {}: {reason:?}",
            classify(frame),
            frame.address
        );
    }
}

/// Stateful front end used during a scan window: ingestion plus optional
/// per-device throttling.
#[derive(Debug, Default)]
pub struct AdvertisementIngestor {
    aggregator: MacAddress,
    throttle: Option<Throttle>,
    accepted: usize,
    dropped: usize,
}

impl AdvertisementIngestor {
    pub fn new(aggregator: MacAddress, throttle: Option<Duration>) -> Self {
        Self {
            aggregator,
            throttle: throttle.map(Throttle::new),
            ..Self::default()
        }
    }

    pub fn ingest(&mut self, frame: &AdvertisementFrame) -> Option<Record> {
        let reading = match decode_frame(frame) {
            Ok(reading) => reading,
            Err(reason) => {
                log_skipped(frame, &reason);
                self.dropped += 1;
                return None;
            }
        };

        let should_emit = self
            .throttle
            .as_mut()
            .is_none_or(|t| t.should_emit(reading.address, reading.marker));
        if !should_emit {
            return None;
        }

        match reading.to_record(self.aggregator) {
            Ok(record) => {
                self.accepted += 1;
                Some(record)
            }
            Err(error) => {
                debug!("dropping reading from {}: {error}", reading.address);
                self.dropped += 1;
                None
            }
        }
    }

    /// Frames turned into records so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Frames from known or unknown sources that were discarded.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn family_of(frame: &AdvertisementFrame) -> SensorFamily {
        classify(frame)
    }
}
