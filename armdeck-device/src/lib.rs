//! Device interface for ArmDeck macro pads
//!
//! This crate sits on top of `armdeck-transport` and provides:
//!
//! - `ConnectionManager`: the staged connection lifecycle and session ownership
//! - `ButtonSynchronizer`: the in-memory button collection, dirty tracking and
//!   debounced saves
//! - `DeviceInfo`: GET_INFO metadata
//! - the button model (actions, colors, HID/media tables) and keymap document

pub mod button;
pub mod device_info;
pub mod error;
pub mod hid_codes;
pub mod keymap;
pub mod lane;
pub mod lifecycle;
pub mod settings;
pub mod stage;
pub mod state;
pub mod synchronizer;

pub use button::{ButtonAction, ButtonConfig, ButtonPatch, Rgb};
pub use device_info::{DeviceInfo, FirmwareVersion};
pub use error::DeckError;
pub use keymap::{KeymapDocument, KeymapEntry, KEYMAP_VERSION};
pub use lane::CommandLane;
pub use lifecycle::{ConnectionManager, StoredConfig};
pub use settings::{DeckSettings, ProtocolSettings, Timing};
pub use stage::{run_stage, StagePolicy};
pub use state::ConnectionState;
pub use synchronizer::{ButtonSynchronizer, SyncEvent};

// Re-exported so callers need only this crate for scanning and connecting
pub use armdeck_transport::{DeviceDiscovery, DiscoveredDevice, ScanFilter, Transport};
