//! Radio boundary: bounded BLE scan windows.
//!
//! A scan yields raw [`AdvertisementFrame`]s through a channel that closes
//! when the window ends. Classification and decoding happen on the
//! receiving side.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::frame::AdvertisementFrame;
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Channel buffer size for advertisement frames.
pub const FRAME_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// No radio; every scan window is empty
    Disabled,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        return Backend::Disabled;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            Backend::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            "disabled" | "none" => Ok(Backend::Disabled),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Scan for `window` using the specified backend.
///
/// Frames arrive on the returned receiver as they are heard. The channel
/// closes once the window has elapsed.
pub async fn start_scan(
    backend: Backend,
    window: Duration,
) -> Result<mpsc::Receiver<AdvertisementFrame>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(window).await,
        Backend::Disabled => {
            debug!("radio disabled, skipping {window:?} scan window");
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter not found");
    }

    #[test]
    fn test_backend_from_str() {
        #[cfg(feature = "bluer")]
        {
            assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
            assert_eq!(Backend::from_str("BlueZ").unwrap(), Backend::Bluer);
        }
        assert_eq!(Backend::from_str("none").unwrap(), Backend::Disabled);
        assert!(Backend::from_str("hci").is_err());
    }

    #[test]
    fn test_backend_display() {
        #[cfg(feature = "bluer")]
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        assert_eq!(format!("{}", Backend::Disabled), "disabled");
    }

    #[tokio::test]
    async fn disabled_backend_yields_empty_window() {
        let mut rx = start_scan(Backend::Disabled, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
