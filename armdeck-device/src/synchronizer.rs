//! Button configuration synchronizer
//!
//! Owns the in-memory button collection for the current session and keeps it
//! in step with the device:
//!
//! - bulk load of every slot when a session comes up (failed slots get
//!   placeholders, so the load always yields `num_buttons` entries)
//! - per-slot dirty tracking for local edits
//! - a debounced save per edited slot, checked against session usability
//!   when it fires
//! - save-all of dirty slots only, and factory reset followed by a reload
//!
//! All device traffic goes through the session's `CommandExchanger`, taken
//! from the shared `CommandLane`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use armdeck_transport::{
    ButtonRecord, CommandExchanger, ExchangeError, ExchangeLane, GetButton, ResetConfig,
    SetButton,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::button::{ButtonConfig, ButtonPatch};
use crate::error::DeckError;
use crate::keymap::KeymapDocument;
use crate::lane::CommandLane;
use crate::settings::{DeckSettings, ProtocolSettings, Timing};

/// Broadcast channel capacity for sync events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Changes to the button collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Collection replaced by a bulk load
    Loaded { count: usize },
    /// Local edit
    SlotChanged { slot: u8 },
    /// Device confirmed a save
    SlotSaved { slot: u8 },
    SaveFailed { slot: u8 },
    /// Session ended, collection back to placeholders
    Cleared,
}

struct ButtonStore {
    buttons: Vec<ButtonConfig>,
    /// Bumped per edit, so a save only cleans what it actually sent
    revisions: Vec<u64>,
    next_revision: u64,
    /// Bumped whenever the collection is replaced
    generation: u64,
    dirty: bool,
    last_saved: Option<SystemTime>,
}

impl ButtonStore {
    fn placeholders(count: u8) -> Vec<ButtonConfig> {
        (0..count).map(ButtonConfig::empty).collect()
    }

    fn replace(&mut self, buttons: Vec<ButtonConfig>) {
        self.revisions = vec![0; buttons.len()];
        self.buttons = buttons;
        self.generation += 1;
        self.dirty = false;
    }
}

pub struct ButtonSynchronizer {
    lane: Arc<CommandLane>,
    timing: Timing,
    protocol: ProtocolSettings,
    store: Mutex<ButtonStore>,
    /// Pending debounced saves by slot
    debounce: Mutex<HashMap<u8, JoinHandle<()>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl ButtonSynchronizer {
    pub fn new(lane: Arc<CommandLane>, settings: &DeckSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let buttons = ButtonStore::placeholders(settings.protocol.default_button_count);
        Arc::new(Self {
            lane,
            timing: settings.timing.clone(),
            protocol: settings.protocol.clone(),
            store: Mutex::new(ButtonStore {
                revisions: vec![0; buttons.len()],
                buttons,
                next_revision: 0,
                generation: 0,
                dirty: false,
                last_saved: None,
            }),
            debounce: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // === Reading ===

    /// Copy of the collection
    pub fn buttons(&self) -> Vec<ButtonConfig> {
        self.store.lock().buttons.clone()
    }

    pub fn button(&self, slot: u8) -> Option<ButtonConfig> {
        self.store.lock().buttons.get(slot as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collection has edits the device has not confirmed
    pub fn is_dirty(&self) -> bool {
        self.store.lock().dirty
    }

    pub fn dirty_slots(&self) -> Vec<u8> {
        self.store
            .lock()
            .buttons
            .iter()
            .filter(|b| b.dirty)
            .map(|b| b.slot)
            .collect()
    }

    pub fn last_saved(&self) -> Option<SystemTime> {
        self.store.lock().last_saved
    }

    /// Collection as a keymap document
    pub fn keymap(&self) -> KeymapDocument {
        KeymapDocument::from_buttons(&self.store.lock().buttons)
    }

    // === Editing ===

    /// Apply `patch` to `slot` and mark it dirty.
    ///
    /// On a fully connected session this also (re)arms the slot's save
    /// debounce.
    pub fn set_slot(self: &Arc<Self>, slot: u8, patch: ButtonPatch) -> Result<ButtonConfig, DeckError> {
        let updated = {
            let mut guard = self.store.lock();
            let store = &mut *guard;
            let count = store.buttons.len();
            let button = store.buttons.get_mut(slot as usize).ok_or_else(|| {
                DeckError::InvalidParameter(format!("slot {} out of range (0..{})", slot, count))
            })?;
            patch.apply(button);
            button.dirty = true;
            store.next_revision += 1;
            store.revisions[slot as usize] = store.next_revision;
            store.dirty = true;
            button.clone()
        };
        let _ = self.events.send(SyncEvent::SlotChanged { slot });

        if self.lane.is_usable() {
            self.arm_debounce(slot);
        } else {
            debug!("Slot {} edited while {}, not scheduling save", slot, self.lane.state());
        }
        Ok(updated)
    }

    fn arm_debounce(self: &Arc<Self>, slot: u8) {
        let delay = self.timing.save_debounce();
        let weak: Weak<Self> = Arc::downgrade(self);
        // Held until the new timer is registered
        let mut pending = self.debounce.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(sync) = weak.upgrade() else {
                return;
            };
            // A re-armed or cancelled timer no longer owns the slot's entry
            let owned = {
                let mut pending = sync.debounce.lock();
                match pending.get(&slot) {
                    Some(task) if task.id() == tokio::task::id() => {
                        pending.remove(&slot);
                        true
                    }
                    _ => false,
                }
            };
            if owned {
                sync.debounced_save(slot).await;
            }
        });
        if let Some(previous) = pending.insert(slot, task) {
            previous.abort();
        }
    }

    async fn debounced_save(&self, slot: u8) {
        let exchanger = match self.lane.usable("save a button") {
            Ok(exchanger) => exchanger,
            Err(e) => {
                debug!("Debounced save of slot {} dropped: {}", slot, e);
                return;
            }
        };
        let result = self.save_with(&exchanger, slot, true).await;
        match self.lane.check(&exchanger, result) {
            Ok(true) => debug!("Auto-saved slot {}", slot),
            Ok(false) => {}
            Err(e) if e.is_cancelled() => debug!("Auto-save of slot {} cancelled", slot),
            Err(e) => warn!("Auto-save of slot {} failed: {}", slot, e),
        }
    }

    /// Abort every pending debounced save
    pub fn cancel_pending(&self) {
        let pending: Vec<_> = self.debounce.lock().drain().collect();
        if !pending.is_empty() {
            debug!("Cancelling {} pending save(s)", pending.len());
        }
        for (_, task) in pending {
            task.abort();
        }
    }

    pub fn pending_saves(&self) -> usize {
        self.debounce.lock().len()
    }

    // === Saving ===

    /// Write one slot to the device, dirty or not
    pub async fn save_slot(&self, slot: u8) -> Result<(), DeckError> {
        let exchanger = self.lane.usable("save a button")?;
        let result = self.save_with(&exchanger, slot, false).await.map(|_| ());
        self.lane.check(&exchanger, result)
    }

    /// Write every dirty slot. Returns how many were saved.
    ///
    /// Stops at the first failure; that slot and the rest stay dirty.
    pub async fn save_all(&self) -> Result<usize, DeckError> {
        let exchanger = self.lane.usable("save buttons")?;
        let dirty = self.dirty_slots();
        if dirty.is_empty() {
            debug!("Nothing to save");
            return Ok(0);
        }
        let result = self.save_dirty(&exchanger, dirty).await;
        self.lane.check(&exchanger, result)
    }

    async fn save_dirty(&self, exchanger: &CommandExchanger, dirty: Vec<u8>) -> Result<usize, DeckError> {
        let mut lane = exchanger.lane().await?;
        let mut saved = 0;
        for (i, slot) in dirty.into_iter().enumerate() {
            if i > 0 {
                lane.pause(self.timing.slot_save_gap()).await?;
            }
            if self.save_locked(&mut lane, slot, true).await? {
                saved += 1;
            }
        }
        info!("Saved {} button(s)", saved);
        Ok(saved)
    }

    async fn save_with(
        &self,
        exchanger: &CommandExchanger,
        slot: u8,
        only_dirty: bool,
    ) -> Result<bool, DeckError> {
        let mut lane = exchanger.lane().await?;
        self.save_locked(&mut lane, slot, only_dirty).await
    }

    /// SET_BUTTON for `slot` on a held lane. `Ok(false)` if skipped as clean.
    async fn save_locked(
        &self,
        lane: &mut ExchangeLane<'_>,
        slot: u8,
        only_dirty: bool,
    ) -> Result<bool, DeckError> {
        let (record, revision, generation) = {
            let store = self.store.lock();
            let button = store.buttons.get(slot as usize).ok_or_else(|| {
                DeckError::InvalidParameter(format!("slot {} out of range", slot))
            })?;
            if only_dirty && !button.dirty {
                return Ok(false);
            }
            (
                button.to_record(),
                store.revisions[slot as usize],
                store.generation,
            )
        };

        if let Err(e) = lane.request(&SetButton(record)).await {
            let _ = self.events.send(SyncEvent::SaveFailed { slot });
            return Err(e.into());
        }

        {
            let mut store = self.store.lock();
            if store.generation == generation {
                if store.revisions[slot as usize] == revision {
                    store.buttons[slot as usize].dirty = false;
                } else {
                    debug!("Slot {} edited during save, keeping it dirty", slot);
                }
                store.dirty = store.buttons.iter().any(|b| b.dirty);
                store.last_saved = Some(SystemTime::now());
            }
        }
        let _ = self.events.send(SyncEvent::SlotSaved { slot });
        Ok(true)
    }

    // === Loading ===

    /// Read `count` slots on a held lane and replace the collection.
    ///
    /// A slot the device fails to return becomes a placeholder. Returns the
    /// number of placeholders used. Nothing is replaced if the session is
    /// cancelled or the link fails.
    pub(crate) async fn load_all(&self, lane: &mut ExchangeLane<'_>, count: u8) -> Result<usize, DeckError> {
        let mut buttons = Vec::with_capacity(count as usize);
        let mut defaulted = 0;
        for slot in 0..count {
            if slot > 0 {
                lane.pause(self.timing.slot_load_gap()).await?;
            }
            match lane.query::<_, ButtonRecord>(&GetButton { slot }).await {
                Ok(record) => buttons.push(ButtonConfig::from_record(slot, &record)),
                Err(ExchangeError::Cancelled) => return Err(DeckError::Cancelled),
                Err(ExchangeError::Transport(e)) => return Err(DeckError::Transport(e)),
                Err(e) => {
                    warn!("Slot {} failed to load, using defaults: {}", slot, e);
                    defaulted += 1;
                    buttons.push(ButtonConfig::empty(slot));
                }
            }
        }

        self.cancel_pending();
        self.store.lock().replace(buttons);
        let _ = self.events.send(SyncEvent::Loaded {
            count: count as usize,
        });
        info!("Loaded {} button(s), {} defaulted", count, defaulted);
        Ok(defaulted)
    }

    /// Factory reset, then reload from the device
    pub async fn reset(&self) -> Result<(), DeckError> {
        let exchanger = self.lane.usable("reset the configuration")?;
        let result = self.reset_with(&exchanger).await;
        self.lane.check(&exchanger, result)
    }

    async fn reset_with(&self, exchanger: &CommandExchanger) -> Result<(), DeckError> {
        let mut lane = exchanger.lane().await?;
        self.cancel_pending();

        lane.request(&ResetConfig {
            opcode: self.protocol.reset_opcode,
        })
        .await?;
        info!("Configuration reset, reloading");

        let count = match self.len() {
            0 => self.protocol.default_button_count,
            n => n.min(u8::MAX as usize) as u8,
        };
        self.load_all(&mut lane, count).await?;
        self.store.lock().last_saved = Some(SystemTime::now());
        Ok(())
    }

    /// Drop session data: pending saves and the loaded collection
    pub(crate) fn clear(&self) {
        self.cancel_pending();
        let placeholders = ButtonStore::placeholders(self.protocol.default_button_count);
        {
            let mut store = self.store.lock();
            store.replace(placeholders);
            store.last_saved = None;
        }
        let _ = self.events.send(SyncEvent::Cleared);
    }
}

impl Drop for ButtonSynchronizer {
    fn drop(&mut self) {
        for (_, task) in self.debounce.get_mut().drain() {
            task.abort();
        }
    }
}
