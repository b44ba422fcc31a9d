//! Connection lifecycle manager
//!
//! Drives one session at a time through the connection stages, owns the
//! session-scoped resources (link, exchanger, cancellation token, link-loss
//! watcher) and releases all of them together on disconnect, link loss or
//! failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use armdeck_transport::protocol::uuids;
use armdeck_transport::{
    CommandExchanger, ConfigSnapshot, DeviceDiscovery, DiscoveredDevice, Endpoint, ExchangeError,
    GetConfig, LinkEvent, Restart, ScanFilter, SessionToken, TestButton, Transport, TransportError,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::button::{ButtonConfig, ButtonPatch};
use crate::device_info::DeviceInfo;
use crate::error::DeckError;
use crate::keymap::KeymapDocument;
use crate::lane::CommandLane;
use crate::settings::DeckSettings;
use crate::stage::run_stage;
use crate::state::ConnectionState;
use crate::synchronizer::ButtonSynchronizer;

/// Button table as stored on the device (GET_CONFIG)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConfig {
    pub version: u8,
    pub buttons: Vec<ButtonConfig>,
}

impl StoredConfig {
    fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        Self {
            version: snapshot.version,
            buttons: snapshot
                .buttons
                .iter()
                .enumerate()
                .map(|(i, record)| ButtonConfig::from_record(i as u8, record))
                .collect(),
        }
    }
}

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Requested,
    /// Adapter reported the link gone
    LinkLost,
    /// An exchange hit a link-level error
    LinkFailed,
    Failed,
}

/// Resources owned by the current session
struct Session {
    generation: u64,
    token: SessionToken,
    device: DiscoveredDevice,
    link: Option<Arc<dyn Transport>>,
    exchanger: Option<Arc<CommandExchanger>>,
    keymap: Option<Endpoint>,
    watcher: Option<JoinHandle<()>>,
}

struct Shared {
    discovery: Arc<dyn DeviceDiscovery>,
    settings: DeckSettings,
    state: watch::Sender<ConnectionState>,
    device_info: watch::Sender<Option<Arc<DeviceInfo>>>,
    lane: Arc<CommandLane>,
    sync: Arc<ButtonSynchronizer>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    last_disconnected: Mutex<Option<Instant>>,
    /// Held for the whole of a connect or retest
    connecting: tokio::sync::Mutex<()>,
}

/// Entry point for talking to one ArmDeck at a time
///
/// Configuration writes are only accepted in `FullyConnected`; everything
/// else is rejected locally with `NotReady`.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(discovery: Arc<dyn DeviceDiscovery>, settings: DeckSettings) -> Self {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (device_info, _) = watch::channel(None);
        let lane = Arc::new(CommandLane::new(state_rx));
        let sync = ButtonSynchronizer::new(lane.clone(), &settings);
        Self {
            shared: Arc::new(Shared {
                discovery,
                settings,
                state,
                device_info,
                lane,
                sync,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                last_disconnected: Mutex::new(None),
                connecting: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // === Observation ===

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Caller-visible "connected": the command endpoint is held
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn device_info(&self) -> Option<Arc<DeviceInfo>> {
        self.shared.device_info.borrow().clone()
    }

    pub fn subscribe_device_info(&self) -> watch::Receiver<Option<Arc<DeviceInfo>>> {
        self.shared.device_info.subscribe()
    }

    /// Device of the current session
    pub fn device(&self) -> Option<DiscoveredDevice> {
        self.shared.session.lock().as_ref().map(|s| s.device.clone())
    }

    pub fn settings(&self) -> &DeckSettings {
        &self.shared.settings
    }

    pub fn synchronizer(&self) -> &Arc<ButtonSynchronizer> {
        &self.shared.sync
    }

    pub fn has_keymap_endpoint(&self) -> bool {
        self.shared
            .session
            .lock()
            .as_ref()
            .is_some_and(|s| s.keymap.is_some())
    }

    // === Discovery ===

    /// Scan for devices. The state stays `Scanning` until a device is
    /// selected or `disconnect` is called.
    pub async fn scan(
        &self,
        filter: &ScanFilter,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, DeckError> {
        let state = self.state();
        if !state.can_connect() {
            return Err(DeckError::Busy(format!("cannot scan while {}", state)));
        }
        self.shared.set_state_unchecked(ConnectionState::Scanning);

        match self.shared.discovery.scan(filter, duration).await {
            Ok(mut devices) => {
                devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
                info!("Scan found {} device(s)", devices.len());
                Ok(devices)
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                self.shared
                    .set_state_unchecked(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Scan, then connect to the strongest matching device
    pub async fn connect_first(
        &self,
        filter: &ScanFilter,
        duration: Duration,
    ) -> Result<DiscoveredDevice, DeckError> {
        let devices = self.scan(filter, duration).await?;
        let device = devices.into_iter().next().ok_or_else(|| {
            self.shared.set_state_unchecked(ConnectionState::Disconnected);
            DeckError::Transport(TransportError::DeviceNotFound(
                "no ArmDeck in range".to_string(),
            ))
        })?;
        self.connect(&device).await?;
        Ok(device)
    }

    // === Connection ===

    /// Run every stage up to `FullyConnected`.
    ///
    /// If the communication test fails the link stays up in
    /// `TestingCommunication` and `CommunicationFailed` is returned; see
    /// `retry_communication`. Any other failure releases the session.
    pub async fn connect(&self, device: &DiscoveredDevice) -> Result<(), DeckError> {
        let shared = &self.shared;
        let _attempt = shared
            .connecting
            .try_lock()
            .map_err(|_| DeckError::Busy("connection attempt in progress".to_string()))?;
        let state = self.state();
        if !state.can_connect() {
            return Err(DeckError::Busy(format!("cannot connect while {}", state)));
        }

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = SessionToken::new();
        let stale = shared.session.lock().replace(Session {
            generation,
            token: token.clone(),
            device: device.clone(),
            link: None,
            exchanger: None,
            keymap: None,
            watcher: None,
        });
        if let Some(stale) = stale {
            shared.release(stale, Teardown::Requested).await;
        }

        info!("Connecting to {}", device.display_name());
        let result = async {
            shared.wait_cooldown(&token).await?;
            let exchanger = shared.open_session(generation, device, &token).await?;
            shared.bring_up(generation, &exchanger).await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                debug!("Connection attempt to {} cancelled", device.display_name());
                Err(e)
            }
            Err(e @ DeckError::CommunicationFailed(_)) => {
                warn!("{}", e);
                Err(e)
            }
            Err(e @ DeckError::Transport(_)) => shared.settle(Some(generation), Err(e)).await,
            Err(e) => {
                warn!("Connection to {} failed: {}", device.display_name(), e);
                shared
                    .teardown(generation, ConnectionState::ConnectionFailed, Teardown::Failed)
                    .await;
                Err(e)
            }
        }
    }

    /// Re-run the communication test and bulk load on a session left in
    /// `TestingCommunication`
    pub async fn retry_communication(&self) -> Result<(), DeckError> {
        let shared = &self.shared;
        let _attempt = shared
            .connecting
            .try_lock()
            .map_err(|_| DeckError::Busy("connection attempt in progress".to_string()))?;
        let state = self.state();
        let current = shared
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.exchanger.clone().map(|e| (s.generation, e)));
        let (generation, exchanger) = match current {
            Some(current) if state == ConnectionState::TestingCommunication => current,
            _ => {
                return Err(DeckError::NotReady {
                    operation: "retry the communication test",
                    state,
                })
            }
        };

        info!("Retrying communication test");
        match shared.bring_up(generation, &exchanger).await {
            Err(e @ DeckError::CommunicationFailed(_)) => {
                warn!("{}", e);
                Err(e)
            }
            other => shared.settle(Some(generation), other).await,
        }
    }

    /// End the session and release everything it held
    pub async fn disconnect(&self) {
        let generation = self.shared.session.lock().as_ref().map(|s| s.generation);
        match generation {
            Some(generation) => {
                self.shared
                    .teardown(generation, ConnectionState::Disconnected, Teardown::Requested)
                    .await
            }
            None => self.shared.set_state_unchecked(ConnectionState::Disconnected),
        }
    }

    // === Device operations ===

    /// Re-read GET_INFO and replace the stored snapshot
    pub async fn refresh_device_info(&self) -> Result<Arc<DeviceInfo>, DeckError> {
        let (generation, exchanger) = self.shared.lane.session("refresh device info")?;
        let result = async {
            let mut lane = exchanger.lane().await?;
            DeviceInfo::fetch(&mut lane).await
        }
        .await;
        let info = Arc::new(self.shared.settle(Some(generation), result).await?);
        self.shared.device_info.send_replace(Some(info.clone()));
        Ok(info)
    }

    /// Have the device fire a slot's action as if pressed
    pub async fn test_button(&self, slot: u8) -> Result<(), DeckError> {
        let (generation, exchanger) = self.shared.lane.session("test a button")?;
        let count = self.shared.sync.len();
        if slot as usize >= count {
            return Err(DeckError::InvalidParameter(format!(
                "slot {} out of range (0..{})",
                slot, count
            )));
        }
        let result = async {
            exchanger.lane().await?.request(&TestButton { slot }).await?;
            Ok::<_, DeckError>(())
        }
        .await;
        self.shared.settle(Some(generation), result).await?;
        debug!("Tested slot {}", slot);
        Ok(())
    }

    /// Reboot the device. The session ends either way.
    pub async fn restart(&self) -> Result<(), DeckError> {
        let exchanger = self.shared.lane.usable("restart the device")?;
        let result = exchanger.lane().await?.request(&Restart).await;

        let outcome = match result {
            Ok(_) => Ok(()),
            // Firmware may reboot before answering
            Err(ExchangeError::NoResponse { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        };
        info!("Restart requested, closing session");
        self.disconnect().await;
        outcome
    }

    /// Read the button table as stored on the device, without touching the
    /// in-memory collection
    pub async fn read_stored_config(&self) -> Result<StoredConfig, DeckError> {
        let (generation, exchanger) = self.shared.lane.session("read the stored configuration")?;
        let result = async {
            let snapshot: ConfigSnapshot = exchanger.lane().await?.query(&GetConfig).await?;
            Ok::<_, DeckError>(snapshot)
        }
        .await;
        let snapshot = self.shared.settle(Some(generation), result).await?;
        Ok(StoredConfig::from_snapshot(&snapshot))
    }

    /// Upload the collection as a JSON keymap to the keymap endpoint.
    /// Returns the number of chunks written.
    pub async fn push_keymap(&self) -> Result<usize, DeckError> {
        let (generation, exchanger) = self.shared.lane.session("upload the keymap")?;
        let endpoint = self
            .shared
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.keymap.clone())
            .ok_or_else(|| DeckError::NotSupported("device has no keymap endpoint".to_string()))?;

        let bytes = self.shared.sync.keymap().to_bytes()?;
        let protocol = &self.shared.settings.protocol;
        let result = async {
            let mut lane = exchanger.lane().await?;
            let chunks = lane
                .write_chunked(
                    &endpoint,
                    &bytes,
                    protocol.keymap_chunk_size,
                    self.shared.settings.timing.keymap_chunk_gap(),
                )
                .await?;
            Ok::<_, DeckError>(chunks)
        }
        .await;
        let chunks = self.shared.settle(Some(generation), result).await?;
        info!("Uploaded keymap ({} bytes, {} chunk(s))", bytes.len(), chunks);
        Ok(chunks)
    }

    /// Apply a keymap document to the collection and save the result
    pub async fn apply_keymap(&self, doc: &KeymapDocument) -> Result<usize, DeckError> {
        self.shared.lane.usable("apply a keymap")?;
        for (slot, patch) in doc.patches()? {
            self.shared.sync.set_slot(slot, patch)?;
        }
        self.shared.sync.cancel_pending();
        self.save_all().await
    }

    // === Button configuration ===

    pub fn buttons(&self) -> Vec<ButtonConfig> {
        self.shared.sync.buttons()
    }

    pub fn set_slot(&self, slot: u8, patch: ButtonPatch) -> Result<ButtonConfig, DeckError> {
        self.shared.sync.set_slot(slot, patch)
    }

    pub async fn save_slot(&self, slot: u8) -> Result<(), DeckError> {
        let generation = self.shared.lane.generation();
        let result = self.shared.sync.save_slot(slot).await;
        self.shared.settle(generation, result).await
    }

    pub async fn save_all(&self) -> Result<usize, DeckError> {
        let generation = self.shared.lane.generation();
        let result = self.shared.sync.save_all().await;
        self.shared.settle(generation, result).await
    }

    /// Factory reset and reload
    pub async fn reset(&self) -> Result<(), DeckError> {
        let generation = self.shared.lane.generation();
        let result = self.shared.sync.reset().await;
        self.shared.settle(generation, result).await
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.shared.session.lock().take() {
            session.token.cancel();
            if let Some(watcher) = session.watcher {
                watcher.abort();
            }
        }
        self.shared.sync.cancel_pending();
    }
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    /// Move to `next` if `generation` is still the live session
    fn set_state(&self, generation: u64, next: ConnectionState) -> Result<(), DeckError> {
        if !self.is_current(generation) {
            return Err(DeckError::Cancelled);
        }
        self.set_state_unchecked(next);
        Ok(())
    }

    fn set_state_unchecked(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("State: {} -> {}", previous, next);
        }
    }

    /// Pass `result` through. A transport error ends session `generation`
    /// before the caller sees it.
    async fn settle<T>(
        &self,
        generation: Option<u64>,
        result: Result<T, DeckError>,
    ) -> Result<T, DeckError> {
        if let (Err(DeckError::Transport(e)), Some(generation)) = (&result, generation) {
            if self.is_current(generation) {
                warn!("Link failed: {}", e);
                self.teardown(generation, ConnectionState::Disconnected, Teardown::LinkFailed)
                    .await;
            }
        }
        result
    }

    async fn wait_cooldown(&self, token: &SessionToken) -> Result<(), DeckError> {
        let last = *self.last_disconnected.lock();
        let Some(last) = last else {
            return Ok(());
        };
        let cooldown = self.settings.timing.reconnect_cooldown();
        let elapsed = last.elapsed();
        if elapsed >= cooldown {
            return Ok(());
        }
        let remaining = cooldown - elapsed;
        debug!("Waiting {:?} for the device to release the previous session", remaining);
        if token.sleep(remaining).await {
            Ok(())
        } else {
            Err(DeckError::Cancelled)
        }
    }

    /// Transport connect through endpoint acquisition. Leaves the session
    /// `MinimallyConnected` with its exchanger installed.
    async fn open_session(
        self: &Arc<Self>,
        generation: u64,
        device: &DiscoveredDevice,
        token: &SessionToken,
    ) -> Result<Arc<CommandExchanger>, DeckError> {
        let timing = &self.settings.timing;

        self.set_state(generation, ConnectionState::ConnectingTransport)?;
        let link = run_stage(
            ConnectionState::ConnectingTransport,
            timing.connect_stage(),
            token,
            || async move { Ok::<_, DeckError>(self.discovery.connect(device).await?) },
        )
        .await?;
        let watcher = spawn_link_watcher(
            Arc::downgrade(self),
            generation,
            link.as_ref(),
            self.lane.subscribe_link_failures(),
        );
        let adopted = {
            let mut session = self.session.lock();
            match session.as_mut() {
                Some(s) if s.generation == generation => {
                    s.link = Some(link.clone());
                    s.watcher = Some(watcher);
                    None
                }
                _ => Some(watcher),
            }
        };
        if let Some(orphan) = adopted {
            orphan.abort();
            let _ = link.close().await;
            return Err(DeckError::Cancelled);
        }
        let transport = link.as_ref();

        self.set_state(generation, ConnectionState::AwaitingStabilization)?;
        if !token.sleep(timing.stabilization()).await {
            return Err(DeckError::Cancelled);
        }

        self.set_state(generation, ConnectionState::DiscoveringService)?;
        let service = run_stage(
            ConnectionState::DiscoveringService,
            timing.discovery_stage(),
            token,
            || async move {
                Ok::<_, DeckError>(transport.discover_service(uuids::ARMDECK_SERVICE).await?)
            },
        )
        .await?;

        self.set_state(generation, ConnectionState::AcquiringEndpoints)?;
        let (command, keymap) = run_stage(
            ConnectionState::AcquiringEndpoints,
            timing.endpoint_stage(),
            token,
            || async move {
                let command = transport.endpoint(&service, uuids::COMMAND_ENDPOINT).await?;
                let keymap = transport.endpoint(&service, uuids::KEYMAP_ENDPOINT).await?;
                Ok::<_, DeckError>((command, keymap))
            },
        )
        .await?;
        let command = command.ok_or(DeckError::RequiredEndpointMissing(uuids::COMMAND_ENDPOINT))?;
        if keymap.is_none() {
            warn!("Keymap endpoint missing, bulk keymap upload unavailable");
        }

        let exchanger = Arc::new(CommandExchanger::new(
            link.clone(),
            command,
            timing.exchange(),
            token.clone(),
        ));
        {
            let mut session = self.session.lock();
            match session.as_mut() {
                Some(s) if s.generation == generation => {
                    s.exchanger = Some(exchanger.clone());
                    s.keymap = keymap;
                }
                _ => return Err(DeckError::Cancelled),
            }
        }
        self.lane.attach(generation, exchanger.clone());
        self.set_state(generation, ConnectionState::MinimallyConnected)?;
        Ok(exchanger)
    }

    /// Communication test, bulk load, promotion to `FullyConnected`
    async fn bring_up(
        &self,
        generation: u64,
        exchanger: &Arc<CommandExchanger>,
    ) -> Result<(), DeckError> {
        let timing = &self.settings.timing;
        let token = exchanger.token();

        self.set_state(generation, ConnectionState::TestingCommunication)?;
        if !token.sleep(timing.settle_delay()).await {
            return Err(DeckError::Cancelled);
        }
        let info = run_stage(
            ConnectionState::TestingCommunication,
            timing.communication_stage(),
            token,
            || async move {
                let mut lane = exchanger.lane().await?;
                DeviceInfo::fetch(&mut lane).await
            },
        )
        .await
        .map_err(|e| match e {
            e @ (DeckError::Cancelled | DeckError::Transport(_)) => e,
            e => DeckError::CommunicationFailed(Box::new(e)),
        })?;
        if !self.is_current(generation) {
            return Err(DeckError::Cancelled);
        }
        let count = info.button_count(self.settings.protocol.default_button_count);
        self.device_info.send_replace(Some(Arc::new(info)));

        self.set_state(generation, ConnectionState::LoadingConfiguration)?;
        {
            let mut lane = exchanger.lane().await?;
            self.sync.load_all(&mut lane, count).await?;
        }

        self.set_state(generation, ConnectionState::FullyConnected)?;
        info!("ArmDeck ready ({} buttons)", count);
        Ok(())
    }

    /// Release session `generation` and settle in `final_state`.
    /// No-op if that session is already gone.
    async fn teardown(&self, generation: u64, final_state: ConnectionState, reason: Teardown) {
        let session = {
            let mut current = self.session.lock();
            match current.as_ref() {
                Some(s) if s.generation == generation => current.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return;
        };
        debug!("Tearing down session {} ({:?})", generation, reason);
        self.set_state_unchecked(final_state);
        self.release(session, reason).await;
    }

    async fn release(&self, session: Session, reason: Teardown) {
        session.token.cancel();
        if let Some(watcher) = session.watcher {
            // Unless this teardown runs on the watcher itself
            if tokio::task::try_id() != Some(watcher.id()) {
                watcher.abort();
            }
        }
        self.lane.detach();
        self.sync.clear();
        self.device_info.send_replace(None);

        if let Some(link) = session.link {
            *self.last_disconnected.lock() = Some(Instant::now());
            if reason != Teardown::LinkLost {
                if let Err(e) = link.close().await {
                    debug!("Closing link: {}", e);
                }
            }
        }
    }
}

/// Ends session `generation` when the adapter drops the link, or when an
/// exchange outside any caller (a debounced save) hits a link error
fn spawn_link_watcher(
    shared: Weak<Shared>,
    generation: u64,
    link: &dyn Transport,
    mut failures: watch::Receiver<u64>,
) -> JoinHandle<()> {
    let mut events = link.subscribe_link_events();
    tokio::spawn(async move {
        let reason = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(LinkEvent::Disconnected) | Err(RecvError::Closed) => break Teardown::LinkLost,
                    Err(RecvError::Lagged(_)) => continue,
                },
                changed = failures.changed() => match changed {
                    Ok(()) if *failures.borrow_and_update() == generation => {
                        break Teardown::LinkFailed
                    }
                    Ok(()) => continue,
                    Err(_) => return,
                },
            }
        };
        if let Some(shared) = shared.upgrade() {
            if shared.is_current(generation) {
                warn!("Link lost ({:?})", reason);
                shared
                    .teardown(generation, ConnectionState::Disconnected, reason)
                    .await;
            }
        }
    })
}
