//! `datagator` library.
//!
//! Core of a duty-cycled field data logger: BLE advertisement decoding,
//! persistent task scheduling over a reset counter, and timestamp
//! reconciliation between network and counter-derived time.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The core “business logic” lives in [`crate::app`] where it can be tested
//! deterministically with injected scanner, clock, peripherals and sinks.

pub mod app;
pub mod classifier;
pub mod codec;
pub mod family;
pub mod frame;
pub mod ingest;
pub mod mac_address;
pub mod output;
pub mod peripherals;
pub mod reading;
pub mod reconciler;
pub mod scanner;
pub mod scheduler;
pub mod service_uuid;
pub mod store;
pub mod throttle;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use classifier::classify;
pub use codec::{DecodeError, decode};
pub use family::SensorFamily;
pub use frame::{AdvertisementFrame, AdvertisementPayload};
pub use ingest::{AdvertisementIngestor, ingest};
pub use mac_address::MacAddress;
pub use output::{LogRouter, LogSink, Record};
pub use reading::DecodedReading;
pub use reconciler::{AbsoluteClock, NetworkTimeSource, TimestampReconciler, TimestampState};
pub use scanner::{Backend, ScanError};
pub use scheduler::{DutyCycleScheduler, ScheduleConfig, ScheduleError, TaskKind, Tick};
pub use service_uuid::ServiceUuid;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use throttle::{Throttle, parse_duration};
pub use timestamp::{TimeError, Timestamp};
