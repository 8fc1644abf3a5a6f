//! Radio abstraction for Govee advertisement scanning.
//!
//! The scan loop only talks to the [`Radio`] trait: enable the adapter once,
//! then run bounded scan windows that push raw [`Advertisement`]s into a
//! channel. Decoding and roster filtering happen on the receiving side so
//! the whole pipeline can be driven without Bluetooth hardware.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Govee manufacturer id, as used for manufacturer-data lookup.
pub const GOVEE_MANUFACTURER_ID: u16 = 0xEC88;

/// Channel buffer size between the radio and the ingest task.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// One received broadcast: sender address plus manufacturer data by vendor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: MacAddress,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl Advertisement {
    pub fn new(address: MacAddress, manufacturer_data: HashMap<u16, Vec<u8>>) -> Self {
        Self {
            address,
            manufacturer_data,
        }
    }

    /// Advertisement carrying a single Govee payload.
    pub fn govee(address: MacAddress, payload: &[u8]) -> Self {
        Self::new(
            address,
            HashMap::from([(GOVEE_MANUFACTURER_ID, payload.to_vec())]),
        )
    }

    /// Payload for `vendor`, with the company id already stripped.
    pub fn vendor_payload(&self, vendor: u16) -> Option<&[u8]> {
        self.manufacturer_data.get(&vendor).map(Vec::as_slice)
    }
}

/// Error type for radio operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Boxed future returned by [`Radio`] methods.
pub type RadioFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// Radio capability used by the scan loop.
pub trait Radio: Send + Sync {
    /// Power on the adapter. Called once before the first scan.
    fn enable(&self) -> RadioFuture<'_>;

    /// Scan for `duration`, sending every received advertisement to `tx`.
    ///
    /// Returns when the window has elapsed. Dropping the returned future
    /// stops scanning.
    fn scan(&self, duration: Duration, tx: mpsc::Sender<Advertisement>) -> RadioFuture<'_>;
}

/// Available radio backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[default]
    Bluer,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Bluer => write!(f, "bluer"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bluer" | "bluez" => Ok(Backend::Bluer),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Open the radio for `backend`.
///
/// Fails with [`ScanError::BackendNotAvailable`] when the backend was not
/// compiled in.
pub async fn open_radio(backend: Backend) -> Result<Arc<dyn Radio>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Ok(Arc::new(bluer::BluerRadio::open().await?)),
        #[cfg(not(feature = "bluer"))]
        Backend::Bluer => Err(ScanError::BackendNotAvailable(backend.to_string())),
    }
}
