//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{FRAME_CHANNEL_BUFFER_SIZE, ScanError};
use crate::frame::AdvertisementFrame;
use crate::mac_address::MacAddress;
use crate::service_uuid::ServiceUuid;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use log::{debug, warn};
use std::pin::pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start an LE discovery session that ends after `window`.
///
/// Every service-data entry and every manufacturer-data entry of a device
/// heard during the window becomes one frame.
pub async fn start_scan(window: Duration) -> Result<mpsc::Receiver<AdvertisementFrame>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_BUFFER_SIZE);
    let deadline = Instant::now() + window;

    // The task owns the session; dropping the event stream stops discovery.
    tokio::spawn(async move {
        let _session = session;
        let events = match adapter.discover_devices().await {
            Ok(events) => events,
            Err(e) => {
                warn!("cannot start discovery: {e}");
                return;
            }
        };
        let mut events = pin!(events);

        while let Ok(Some(event)) = timeout_at(deadline, events.next()).await {
            if let AdapterEvent::DeviceAdded(address) = event
                && let Err(e) = process_device(&adapter, address, &tx).await
            {
                debug!("skipping {address}: {e}");
            }
        }
        debug!("scan window closed");
    });

    Ok(rx)
}

/// Read the advertised data of one device and forward it as frames.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<AdvertisementFrame>,
) -> Result<(), ScanError> {
    let device = adapter.device(address)?;
    let mac: MacAddress = address.into();
    let name = device.name().await?;

    let mut frames = Vec::new();
    if let Some(service_data) = device.service_data().await? {
        for (uuid, data) in service_data {
            frames.push(AdvertisementFrame::service_data(
                mac,
                ServiceUuid::from(uuid),
                data,
            ));
        }
    }
    if let Some(manufacturer_data) = device.manufacturer_data().await? {
        for (company_id, data) in manufacturer_data {
            frames.push(AdvertisementFrame::manufacturer_data(mac, company_id, data));
        }
    }
    if frames.is_empty() {
        frames.push(AdvertisementFrame::empty(mac));
    }

    for mut frame in frames {
        frame.local_name = name.clone();
        if tx.send(frame).await.is_err() {
            break;
        }
    }
    Ok(())
}
