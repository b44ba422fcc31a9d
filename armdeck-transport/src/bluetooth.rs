//! Bluetooth LE transport implementation using `btleplug`
//!
//! ArmDeck exposes one vendor GATT service with two characteristics:
//!
//! - **command** (`fb349b5f-…-000002100b7a`): read + write, carries framed
//!   request/response traffic. The reply is fetched with a plain read after
//!   the firmware turnaround delay; there are no notifications.
//! - **keymap** (`fb349b5f-…-000001100b7a`): write only, takes a JSON keymap
//!   in chunks. Older firmware does not expose it.
//!
//! Scans accept devices advertising the `ArmDeck` name prefix or the standard
//! Device Information service (0x180A), which the firmware adds so browsers
//! can find it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter as BtScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::discovery::DeviceDiscovery;
use crate::error::TransportError;
use crate::types::{
    DiscoveredDevice, Endpoint, EndpointProperties, LinkEvent, ScanFilter, ServiceHandle,
    TransportDeviceInfo, TransportType,
};
use crate::Transport;

/// Broadcast channel capacity for link events
const EVENT_CHANNEL_CAPACITY: usize = 8;

// ============================================================================
// Discovery
// ============================================================================

/// BLE discovery on the first available adapter
pub struct BleDiscovery {
    adapter: Adapter,
}

impl BleDiscovery {
    /// Open the first Bluetooth adapter
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Bluetooth("No Bluetooth adapter found".to_string()))?;
        Ok(Self { adapter })
    }

    async fn describe(peripheral: &Peripheral) -> Result<Option<DiscoveredDevice>, TransportError> {
        let Some(props) = peripheral.properties().await? else {
            return Ok(None);
        };
        Ok(Some(DiscoveredDevice {
            info: TransportDeviceInfo {
                transport_type: TransportType::Bluetooth,
                id: peripheral.id().to_string(),
                address: Some(peripheral.address().to_string()),
                name: props.local_name,
            },
            rssi: props.rssi,
            services: props.services,
        }))
    }

    async fn find_peripheral(&self, id: &str) -> Result<Peripheral, TransportError> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.id().to_string() == id {
                return Ok(peripheral);
            }
        }
        Err(TransportError::DeviceNotFound(id.to_string()))
    }
}

#[async_trait]
impl DeviceDiscovery for BleDiscovery {
    async fn scan(
        &self,
        filter: &ScanFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, TransportError> {
        debug!("Scanning for {:?}", duration);
        self.adapter.start_scan(BtScanFilter::default()).await?;
        tokio::time::sleep(duration).await;
        let peripherals = self.adapter.peripherals().await;
        self.adapter.stop_scan().await?;

        let mut devices = Vec::new();
        for peripheral in peripherals? {
            match Self::describe(&peripheral).await {
                Ok(Some(device)) if filter.matches(&device) => {
                    debug!("Found {} ({})", device.display_name(), device.info.id);
                    devices.push(device);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping peripheral {}: {}", peripheral.id(), e),
            }
        }
        Ok(devices)
    }

    async fn connect(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let peripheral = self.find_peripheral(&device.info.id).await?;
        peripheral.connect().await?;
        info!("Connected to {}", device.display_name());

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = spawn_link_watcher(&self.adapter, &peripheral, event_tx.clone()).await?;

        Ok(Arc::new(BleTransport {
            peripheral,
            info: device.info.clone(),
            event_tx,
            characteristics: Mutex::new(HashMap::new()),
            watcher: Mutex::new(Some(watcher)),
        }))
    }
}

/// Forward the adapter's disconnect event for one peripheral
async fn spawn_link_watcher(
    adapter: &Adapter,
    peripheral: &Peripheral,
    tx: broadcast::Sender<LinkEvent>,
) -> Result<JoinHandle<()>, TransportError> {
    let mut events = adapter.events().await?;
    let id = peripheral.id();
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event {
                if gone == id {
                    debug!("Link lost: {}", gone);
                    let _ = tx.send(LinkEvent::Disconnected);
                    break;
                }
            }
        }
    }))
}

// ============================================================================
// Transport
// ============================================================================

/// GATT link to one ArmDeck
pub struct BleTransport {
    peripheral: Peripheral,
    info: TransportDeviceInfo,
    event_tx: broadcast::Sender<LinkEvent>,
    /// Characteristics handed out as endpoints, by UUID
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    fn characteristic(&self, endpoint: &Endpoint) -> Result<Characteristic, TransportError> {
        self.characteristics
            .lock()
            .get(&endpoint.uuid)
            .cloned()
            .ok_or_else(|| TransportError::Internal(format!("endpoint {} not acquired", endpoint.uuid)))
    }
}

fn endpoint_properties(flags: CharPropFlags) -> EndpointProperties {
    EndpointProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn discover_service(&self, service: Uuid) -> Result<ServiceHandle, TransportError> {
        self.peripheral.discover_services().await?;
        let found = self.peripheral.services().iter().any(|s| s.uuid == service);
        if found {
            debug!("Service {} discovered", service);
            Ok(ServiceHandle { uuid: service })
        } else {
            Err(TransportError::ServiceNotFound(service))
        }
    }

    async fn endpoint(
        &self,
        service: &ServiceHandle,
        endpoint: Uuid,
    ) -> Result<Option<Endpoint>, TransportError> {
        let characteristic = self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service.uuid)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|c| c.uuid == endpoint);

        let Some(characteristic) = characteristic else {
            return Ok(None);
        };
        let found = Endpoint {
            service: service.uuid,
            uuid: endpoint,
            properties: endpoint_properties(characteristic.properties),
        };
        self.characteristics.lock().insert(endpoint, characteristic);
        Ok(Some(found))
    }

    async fn write(&self, endpoint: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        if !endpoint.properties.write && !endpoint.properties.write_without_response {
            return Err(TransportError::Unsupported(endpoint.uuid, "write"));
        }
        let characteristic = self.characteristic(endpoint)?;
        let write_type = if endpoint.properties.write {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        trace!("BLE write {} bytes to {}", data.len(), endpoint.uuid);
        self.peripheral
            .write(&characteristic, data, write_type)
            .await?;
        Ok(())
    }

    async fn read(&self, endpoint: &Endpoint) -> Result<Vec<u8>, TransportError> {
        if !endpoint.properties.read {
            return Err(TransportError::Unsupported(endpoint.uuid, "read"));
        }
        let characteristic = self.characteristic(endpoint)?;
        let data = self.peripheral.read(&characteristic).await?;
        trace!("BLE read {} bytes from {}", data.len(), endpoint.uuid);
        Ok(data)
    }

    fn subscribe_link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.characteristics.lock().clear();
        if self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}
