//! Transport abstraction layer for ArmDeck macro pad communication
//!
//! This crate provides the pieces that talk to the device below the
//! connection lifecycle:
//!
//! - `Transport` / `DeviceDiscovery`: the GATT-style link capability
//! - `codec`: `[0xAD][0xDC][cmd][len][body][xor]` framing
//! - `command`: typed requests and payload records
//! - `exchange`: single-flight write/read cycles with the empty-read retry
//! - `bluetooth`: `btleplug` backend (feature `bluetooth`)

pub mod codec;
pub mod command;
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod types;

mod discovery;

#[cfg(feature = "bluetooth")]
pub mod bluetooth;

pub use codec::{decode, encode, encode_response, Frame};
pub use command::{
    ButtonRecord, ConfigSnapshot, DeckRequest, DeckResponse, DeviceInfoRecord, GetButton,
    GetConfig, GetInfo, ParseError, ResetConfig, Restart, SetButton, TestButton,
};
pub use discovery::DeviceDiscovery;
pub use error::{DecodeError, EncodeError, ExchangeError, TransportError};
pub use exchange::{CommandExchanger, ExchangeLane, ExchangeTiming, SessionToken};
pub use types::{
    DiscoveredDevice, Endpoint, EndpointProperties, ErrorCode, LinkEvent, ScanFilter,
    ServiceHandle, TransportDeviceInfo, TransportType,
};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

/// An open link to one device - all backends implement this
///
/// The link only moves bytes. Framing, turnaround delays and retries live in
/// `CommandExchanger`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Discover a service by UUID
    ///
    /// Fails with `ServiceNotFound` when the peripheral does not expose it.
    async fn discover_service(&self, service: Uuid) -> Result<ServiceHandle, TransportError>;

    /// Look up an endpoint inside a discovered service
    ///
    /// Returns `None` when the service has no such endpoint.
    async fn endpoint(
        &self,
        service: &ServiceHandle,
        endpoint: Uuid,
    ) -> Result<Option<Endpoint>, TransportError>;

    /// Write bytes to an endpoint (acknowledged write)
    async fn write(&self, endpoint: &Endpoint, data: &[u8]) -> Result<(), TransportError>;

    /// Read the endpoint's current value
    ///
    /// An empty vector means the device had nothing ready yet.
    async fn read(&self, endpoint: &Endpoint) -> Result<Vec<u8>, TransportError>;

    /// Subscribe to link-loss notifications
    fn subscribe_link_events(&self) -> broadcast::Receiver<LinkEvent>;

    /// Check if transport is still connected
    async fn is_connected(&self) -> bool;

    /// Close the transport gracefully
    async fn close(&self) -> Result<(), TransportError>;
}

