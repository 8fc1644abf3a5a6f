//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{Advertisement, GOVEE_MANUFACTURER_ID, Radio, RadioFuture, ScanError};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Default adapter of the local BlueZ daemon.
pub struct BluerRadio {
    // Keeps the D-Bus connection alive for the adapter handle.
    _session: Session,
    adapter: Adapter,
}

impl BluerRadio {
    pub async fn open() -> Result<Self, ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        debug!(adapter = %adapter.name(), "opened bluetooth adapter");
        Ok(Self {
            _session: session,
            adapter,
        })
    }
}

impl Radio for BluerRadio {
    fn enable(&self) -> RadioFuture<'_> {
        Box::pin(async move {
            self.adapter.set_powered(true).await?;
            Ok(())
        })
    }

    fn scan(&self, duration: Duration, tx: mpsc::Sender<Advertisement>) -> RadioFuture<'_> {
        Box::pin(async move {
            // Changed devices are reported as DeviceAdded again, so every
            // manufacturer-data update shows up as a new event.
            let events = self.adapter.discover_devices_with_changes().await?;
            let mut events = std::pin::pin!(events);
            let window = tokio::time::sleep(duration);
            tokio::pin!(window);

            loop {
                tokio::select! {
                    _ = &mut window => return Ok(()),
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            if let Err(e) = forward_device(&self.adapter, address, &tx).await {
                                debug!(%address, error = %e, "failed to read advertisement");
                            }
                        }
                        Some(_) => {}
                        None => {
                            return Err(ScanError::Bluetooth("discovery stream ended".to_string()));
                        }
                    },
                }
            }
        })
    }
}

/// Read the manufacturer data of a discovered device and forward it when it
/// carries a Govee payload.
async fn forward_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<Advertisement>,
) -> Result<(), ScanError> {
    let device = adapter.device(address)?;

    let manufacturer_data = match device.manufacturer_data().await? {
        Some(data) => data,
        None => return Ok(()),
    };
    if !manufacturer_data.contains_key(&GOVEE_MANUFACTURER_ID) {
        return Ok(());
    }

    let _ = tx
        .send(Advertisement::new(address.into(), manufacturer_data))
        .await;
    Ok(())
}
