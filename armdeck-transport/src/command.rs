//! Type-safe command builders and response parsers
//!
//! Each request knows its opcode and payload bytes; each response parses the
//! payload that follows the error code byte.

use std::fmt;

use crate::protocol::{button, cmd};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// =============================================================================
// Core Traits
// =============================================================================

/// A request that can be serialized to a frame body
pub trait DeckRequest {
    /// Opcode for this request
    fn command(&self) -> u8;

    /// Serialize to payload bytes
    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// A response payload that can be parsed
pub trait DeckResponse: Sized {
    /// Minimum payload length required
    const MIN_LEN: usize;

    /// Parse from payload bytes (error code already stripped)
    fn from_payload(data: &[u8]) -> Result<Self, ParseError>;

    /// Parse with length validation
    fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < Self::MIN_LEN {
            return Err(ParseError::TooShort {
                expected: Self::MIN_LEN,
                got: data.len(),
            });
        }
        Self::from_payload(data)
    }
}

/// Parse error for responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooShort { expected: usize, got: usize },
    InvalidValue { field: &'static str, value: u8 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { expected, got } => {
                write!(
                    f,
                    "Payload too short: expected {} bytes, got {}",
                    expected, got
                )
            }
            Self::InvalidValue { field, value } => {
                write!(f, "Invalid value for {}: 0x{:02X}", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

// =============================================================================
// Device info
// =============================================================================

/// GET_INFO (0x10)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetInfo;

impl DeckRequest for GetInfo {
    fn command(&self) -> u8 {
        cmd::GET_INFO
    }
}

/// GET_INFO payload, 32 bytes on current firmware.
///
/// Older firmware sends fewer bytes; missing fields read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DeviceInfoRecord {
    pub protocol_version: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_patch: u8,
    pub num_buttons: u8,
    pub battery_level: u8,
    uptime: [u8; 4],
    free_heap: [u8; 4],
    _reserved: [u8; 2],
    device_name: [u8; 16],
}

impl DeviceInfoRecord {
    pub const SIZE: usize = 32;

    pub fn uptime_seconds(&self) -> u32 {
        u32::from_le_bytes(self.uptime)
    }

    pub fn free_heap_bytes(&self) -> u32 {
        u32::from_le_bytes(self.free_heap)
    }

    /// Device name up to the first NUL, whitespace trimmed
    pub fn device_name(&self) -> String {
        nul_terminated(&self.device_name).trim().to_string()
    }
}

impl DeckResponse for DeviceInfoRecord {
    const MIN_LEN: usize = 0;

    fn from_payload(data: &[u8]) -> Result<Self, ParseError> {
        let mut raw = [0u8; Self::SIZE];
        let len = data.len().min(Self::SIZE);
        raw[..len].copy_from_slice(&data[..len]);
        Self::read_from_bytes(&raw).map_err(|_| ParseError::TooShort {
            expected: Self::SIZE,
            got: len,
        })
    }
}

// =============================================================================
// Buttons
// =============================================================================

/// 16-byte button record, identical for GET_BUTTON replies and SET_BUTTON
/// requests.
///
/// ```text
/// [slot][action_type][code][modifier][R][G][B][0][label: 8, NUL-terminated]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ButtonRecord {
    pub slot: u8,
    pub action_type: u8,
    pub code: u8,
    pub modifier: u8,
    pub rgb: [u8; 3],
    _reserved: u8,
    label: [u8; button::LABEL_FIELD],
}

impl ButtonRecord {
    pub fn new(slot: u8, action_type: u8, code: u8, rgb: [u8; 3], label: &str) -> Self {
        Self {
            slot,
            action_type,
            code,
            modifier: 0,
            rgb,
            _reserved: 0,
            label: encode_label(label),
        }
    }

    pub fn label(&self) -> String {
        nul_terminated(&self.label)
    }
}

impl DeckResponse for ButtonRecord {
    const MIN_LEN: usize = button::RECORD_SIZE;

    fn from_payload(data: &[u8]) -> Result<Self, ParseError> {
        Self::read_from_prefix(data)
            .map(|(record, _)| record)
            .map_err(|_| ParseError::TooShort {
                expected: button::RECORD_SIZE,
                got: data.len(),
            })
    }
}

/// GET_BUTTON (0x30)
#[derive(Debug, Clone, Copy)]
pub struct GetButton {
    pub slot: u8,
}

impl DeckRequest for GetButton {
    fn command(&self) -> u8 {
        cmd::GET_BUTTON
    }

    fn payload(&self) -> Vec<u8> {
        vec![self.slot]
    }
}

/// SET_BUTTON (0x31)
#[derive(Debug, Clone, Copy)]
pub struct SetButton(pub ButtonRecord);

impl DeckRequest for SetButton {
    fn command(&self) -> u8 {
        cmd::SET_BUTTON
    }

    fn payload(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

/// TEST_BUTTON (0x40): fire a slot's action as if pressed
#[derive(Debug, Clone, Copy)]
pub struct TestButton {
    pub slot: u8,
}

impl DeckRequest for TestButton {
    fn command(&self) -> u8 {
        cmd::TEST_BUTTON
    }

    fn payload(&self) -> Vec<u8> {
        vec![self.slot]
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Factory reset. The opcode differs between firmware generations.
#[derive(Debug, Clone, Copy)]
pub struct ResetConfig {
    pub opcode: u8,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            opcode: cmd::RESET_CONFIG,
        }
    }
}

impl DeckRequest for ResetConfig {
    fn command(&self) -> u8 {
        self.opcode
    }
}

/// RESTART (0x50)
#[derive(Debug, Clone, Copy, Default)]
pub struct Restart;

impl DeckRequest for Restart {
    fn command(&self) -> u8 {
        cmd::RESTART
    }
}

/// GET_CONFIG (0x20)
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConfig;

impl DeckRequest for GetConfig {
    fn command(&self) -> u8 {
        cmd::GET_CONFIG
    }
}

/// GET_CONFIG payload: `[version][num_buttons][reserved: 2][records...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub version: u8,
    pub num_buttons: u8,
    pub buttons: Vec<ButtonRecord>,
}

impl DeckResponse for ConfigSnapshot {
    const MIN_LEN: usize = 4;

    fn from_payload(data: &[u8]) -> Result<Self, ParseError> {
        let num_buttons = data[1];
        if num_buttons as usize > button::CONFIG_TABLE_SLOTS {
            return Err(ParseError::InvalidValue {
                field: "num_buttons",
                value: num_buttons,
            });
        }
        // Firmware may send a partial table; keep the complete records.
        let buttons = data[4..]
            .chunks_exact(button::RECORD_SIZE)
            .take(num_buttons as usize)
            .map(ButtonRecord::from_payload)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: data[0],
            num_buttons,
            buttons,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Printable ASCII only, at most 7 characters, NUL padded
fn encode_label(label: &str) -> [u8; button::LABEL_FIELD] {
    let mut out = [0u8; button::LABEL_FIELD];
    let chars = label
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() || c == ' ' {
                c as u8
            } else {
                b'?'
            }
        })
        .take(button::LABEL_MAX_CHARS);
    for (slot, byte) in out.iter_mut().zip(chars) {
        *slot = byte;
    }
    out
}
