//! In-process ArmDeck stand-in for integration tests
//!
//! Emulates the firmware command handler behind the `Transport` trait, with
//! knobs for injecting the failures the lifecycle has to survive.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use armdeck_device::{ConnectionManager, DeckSettings};
use armdeck_transport::protocol::{action_type, cmd, uuids};
use armdeck_transport::{
    decode, encode_response, ButtonRecord, DeckRequest, DeckResponse, DeviceDiscovery,
    DiscoveredDevice, Endpoint, EndpointProperties, ErrorCode, LinkEvent, ScanFilter, ServiceHandle,
    SetButton, Transport, TransportDeviceInfo, TransportError, TransportType,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const SIM_NAME: &str = "ArmDeck-Sim";

/// Factory table of the simulated firmware
pub fn factory_buttons() -> Vec<ButtonRecord> {
    let media = action_type::MEDIA;
    let key = action_type::KEY;
    let table: [(u8, u8, [u8; 3], &str); 12] = [
        (media, 0xCD, [0x4C, 0xAF, 0x50], "Play"),
        (media, 0xB5, [0x21, 0x96, 0xF3], "Next"),
        (media, 0xB6, [0x21, 0x96, 0xF3], "Prev"),
        (media, 0xE9, [0xFF, 0x98, 0x00], "Vol+"),
        (media, 0xEA, [0xFF, 0x98, 0x00], "Vol-"),
        (media, 0xE2, [0xF4, 0x43, 0x36], "Mute"),
        (media, 0xB7, [0x9C, 0x27, 0xB0], "Stop"),
        (key, 0x6F, [0x60, 0x7D, 0x8B], "F20"),
        (key, 0x70, [0x60, 0x7D, 0x8B], "F21"),
        (key, 0x71, [0x60, 0x7D, 0x8B], "F22"),
        (key, 0x72, [0x60, 0x7D, 0x8B], "F23"),
        (key, 0x73, [0x60, 0x7D, 0x8B], "F24"),
    ];
    table
        .iter()
        .enumerate()
        .map(|(i, (tag, code, rgb, label))| ButtonRecord::new(i as u8, *tag, *code, *rgb, label))
        .collect()
}

#[derive(Default)]
pub struct SimState {
    pub buttons: Vec<ButtonRecord>,
    /// Value of the command characteristic
    reply: Vec<u8>,
    pub connected: bool,

    // Injection
    pub fail_slots: HashSet<u8>,
    pub empty_reads: u32,
    pub garbled_reads: u32,
    pub silent_info: bool,
    pub reject_saves: bool,
    pub missing_command: bool,
    pub missing_keymap: bool,
    pub discovery_delay: Duration,
    /// Link fails, without a disconnect event, when this command is written
    pub dies_on: Option<u8>,

    // Observation
    pub commands: Vec<u8>,
    pub keymap_writes: Vec<Vec<u8>>,
    pub connects: u32,
    pub closes: u32,
    pub discoveries: u32,
}

pub struct SimDeck {
    pub state: Mutex<SimState>,
    info: TransportDeviceInfo,
    events: broadcast::Sender<LinkEvent>,
}

impl SimDeck {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            state: Mutex::new(SimState {
                buttons: factory_buttons(),
                ..Default::default()
            }),
            info: TransportDeviceInfo {
                transport_type: TransportType::Simulated,
                id: "sim-0".to_string(),
                address: Some("AA:BB:CC:DD:EE:FF".to_string()),
                name: Some(SIM_NAME.to_string()),
            },
            events,
        })
    }

    pub fn discovered(&self) -> DiscoveredDevice {
        DiscoveredDevice {
            info: self.info.clone(),
            rssi: Some(-50),
            services: vec![uuids::DEVICE_INFO_SERVICE],
        }
    }

    /// Simulate the peripheral going out of range
    pub fn drop_link(&self) {
        self.state.lock().connected = false;
        let _ = self.events.send(LinkEvent::Disconnected);
    }

    /// Link stops working but the adapter never says so
    pub fn cut_link(&self) {
        self.state.lock().connected = false;
    }

    pub fn count(&self, command: u8) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|&&c| c == command)
            .count()
    }

    pub fn command_log(&self) -> Vec<u8> {
        self.state.lock().commands.clone()
    }

    fn handle(state: &mut SimState, command: u8, payload: &[u8]) -> Option<Vec<u8>> {
        let ok = |payload: &[u8]| encode_response(command, ErrorCode::None, payload).ok();
        let err = |code: ErrorCode| encode_response(command, code, &[]).ok();
        match command {
            cmd::GET_INFO => {
                if state.silent_info {
                    return None;
                }
                let mut info = vec![1, 1, 2, 3, state.buttons.len() as u8, 87];
                info.extend_from_slice(&3_725u32.to_le_bytes());
                info.extend_from_slice(&181_000u32.to_le_bytes());
                info.extend_from_slice(&[0, 0]);
                let mut name = [0u8; 16];
                name[..SIM_NAME.len()].copy_from_slice(SIM_NAME.as_bytes());
                info.extend_from_slice(&name);
                ok(&info)
            }
            cmd::GET_BUTTON => {
                let slot = payload.first().copied().unwrap_or(u8::MAX);
                if state.fail_slots.contains(&slot) {
                    return err(ErrorCode::InvalidParam);
                }
                match state.buttons.get(slot as usize) {
                    Some(record) => ok(&SetButton(*record).payload()),
                    None => err(ErrorCode::InvalidParam),
                }
            }
            cmd::SET_BUTTON => {
                if state.reject_saves {
                    return err(ErrorCode::Busy);
                }
                let Ok(record) = ButtonRecord::parse(payload) else {
                    return err(ErrorCode::Length);
                };
                match state.buttons.get_mut(record.slot as usize) {
                    Some(slot) => {
                        *slot = record;
                        ok(&[])
                    }
                    None => err(ErrorCode::InvalidParam),
                }
            }
            cmd::RESET_CONFIG => {
                state.buttons = factory_buttons();
                ok(&[])
            }
            cmd::GET_CONFIG => {
                let mut table = vec![1, state.buttons.len() as u8, 0, 0];
                for record in &state.buttons {
                    table.extend_from_slice(&SetButton(*record).payload());
                }
                ok(&table)
            }
            cmd::TEST_BUTTON => match payload.first() {
                Some(&slot) if (slot as usize) < state.buttons.len() => ok(&[]),
                _ => err(ErrorCode::InvalidParam),
            },
            cmd::RESTART => ok(&[]),
            _ => err(ErrorCode::InvalidCommand),
        }
    }
}

#[async_trait]
impl Transport for SimDeck {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn discover_service(&self, service: Uuid) -> Result<ServiceHandle, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.discoveries += 1;
            state.discovery_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if service == uuids::ARMDECK_SERVICE {
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
        let state = self.state.lock();
        let properties = if endpoint == uuids::COMMAND_ENDPOINT && !state.missing_command {
            EndpointProperties::READ_WRITE
        } else if endpoint == uuids::KEYMAP_ENDPOINT && !state.missing_keymap {
            EndpointProperties::WRITE
        } else {
            return Ok(None);
        };
        Ok(Some(Endpoint {
            service: service.uuid,
            uuid: endpoint,
            properties,
        }))
    }

    async fn write(&self, endpoint: &Endpoint, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        if endpoint.uuid == uuids::KEYMAP_ENDPOINT {
            state.keymap_writes.push(data.to_vec());
            return Ok(());
        }
        let frame = decode(data).map_err(|e| TransportError::Internal(e.to_string()))?;
        state.commands.push(frame.command);
        if state.dies_on == Some(frame.command) {
            state.connected = false;
            return Err(TransportError::Disconnected);
        }
        let reply = Self::handle(&mut state, frame.command, &frame.body);
        state.reply = reply.unwrap_or_default();
        Ok(())
    }

    async fn read(&self, _endpoint: &Endpoint) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        if state.empty_reads > 0 {
            state.empty_reads -= 1;
            return Ok(Vec::new());
        }
        if state.garbled_reads > 0 {
            state.garbled_reads -= 1;
            return Ok(vec![0x12, 0x34, 0x56, 0x78, 0x9A]);
        }
        Ok(std::mem::take(&mut state.reply))
    }

    fn subscribe_link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.connected = false;
        state.closes += 1;
        Ok(())
    }
}

/// Discovery that always finds the one simulated deck
pub struct SimDiscovery {
    pub deck: Arc<SimDeck>,
}

#[async_trait]
impl DeviceDiscovery for SimDiscovery {
    async fn scan(
        &self,
        filter: &ScanFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, TransportError> {
        tokio::time::sleep(duration).await;
        let device = self.deck.discovered();
        Ok(if filter.matches(&device) {
            vec![device]
        } else {
            Vec::new()
        })
    }

    async fn connect(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if device.info.id != self.deck.info.id {
            return Err(TransportError::DeviceNotFound(device.info.id.clone()));
        }
        {
            let mut state = self.deck.state.lock();
            state.connected = true;
            state.connects += 1;
        }
        Ok(self.deck.clone())
    }
}

pub fn manager_with(deck: &Arc<SimDeck>, settings: DeckSettings) -> ConnectionManager {
    ConnectionManager::new(Arc::new(SimDiscovery { deck: deck.clone() }), settings)
}

pub fn manager(deck: &Arc<SimDeck>) -> ConnectionManager {
    manager_with(deck, DeckSettings::default())
}

/// Manager already in `FullyConnected`
pub async fn connected(deck: &Arc<SimDeck>) -> ConnectionManager {
    let manager = manager(deck);
    manager
        .connect(&deck.discovered())
        .await
        .expect("simulated connect");
    manager
}
