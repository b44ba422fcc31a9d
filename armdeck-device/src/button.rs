//! Button configuration model
//!
//! A button carries a short label, one action and an RGB color. On the wire it
//! is a 16-byte `ButtonRecord`; the action is split into a type tag and a
//! key/media code.

use std::fmt;
use std::str::FromStr;

use armdeck_transport::protocol::{action_type, button};
use armdeck_transport::ButtonRecord;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DeckError;
use crate::hid_codes;

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Blue grey used for unconfigured buttons
    pub const DEFAULT: Rgb = Rgb::new(0x60, 0x7D, 0x8B);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// `#RRGGBB`
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Rgb {
    type Err = DeckError;

    /// Accepts `RRGGBB` with or without a leading `#`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeckError::InvalidParameter(format!(
                "color must be 6 hex digits: {:?}",
                s
            )));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        match (channel(0), channel(2), channel(4)) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Self::new(r, g, b)),
            _ => Err(DeckError::InvalidParameter(format!("bad color {:?}", s))),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Rgb {
    type Error = DeckError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_hex()
    }
}

/// What a button does when pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ButtonAction {
    #[default]
    None,
    /// Keyboard usage
    Key(u8),
    /// Consumer control usage
    Media(u8),
    /// Host-side macro
    Macro,
    /// Firmware custom action
    Custom,
}

impl ButtonAction {
    /// Parse an action name.
    ///
    /// `""` is no action, `KEY_<name>` a key, a media table name a media
    /// action, `MACRO`/`CUSTOM` the host-defined kinds. Unknown names fall back
    /// to `KEY_A` (for `KEY_*`) or play/pause, never to `None`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return ButtonAction::None;
        }
        if name.eq_ignore_ascii_case("MACRO") {
            return ButtonAction::Macro;
        }
        if name.eq_ignore_ascii_case("CUSTOM") {
            return ButtonAction::Custom;
        }

        let upper = name.to_ascii_uppercase();
        if let Some(key) = upper.strip_prefix("KEY_") {
            if let Some(code) = raw_code(key) {
                return ButtonAction::Key(code);
            }
            return match hid_codes::key_code(key) {
                Some(code) => ButtonAction::Key(code),
                None => {
                    warn!("Unknown key {:?}, using KEY_A", name);
                    ButtonAction::Key(hid_codes::FALLBACK_KEY)
                }
            };
        }
        if let Some(code) = hid_codes::media_code(&upper) {
            return ButtonAction::Media(code);
        }
        if let Some(code) = upper.strip_prefix("MEDIA_").and_then(raw_code) {
            return ButtonAction::Media(code);
        }

        if hid_codes::looks_like_media(&upper) {
            warn!("Unknown media action {:?}, using MEDIA_PLAY_PAUSE", name);
        } else {
            warn!("Unrecognized action {:?}, using MEDIA_PLAY_PAUSE", name);
        }
        ButtonAction::Media(hid_codes::FALLBACK_MEDIA)
    }

    /// Canonical name, inverse of `from_name` for table entries
    pub fn name(&self) -> String {
        match self {
            ButtonAction::None => String::new(),
            ButtonAction::Key(code) => match hid_codes::key_name(*code) {
                Some(name) => format!("KEY_{}", name),
                None => format!("KEY_0x{:02X}", code),
            },
            ButtonAction::Media(code) => match hid_codes::media_name(*code) {
                Some(name) => name.to_string(),
                None => format!("MEDIA_0x{:02X}", code),
            },
            ButtonAction::Macro => "MACRO".to_string(),
            ButtonAction::Custom => "CUSTOM".to_string(),
        }
    }

    /// `(action_type, code)` bytes
    pub fn to_wire(self) -> (u8, u8) {
        match self {
            ButtonAction::None => (action_type::NONE, 0),
            ButtonAction::Key(code) => (action_type::KEY, code),
            ButtonAction::Media(code) => (action_type::MEDIA, code),
            ButtonAction::Macro => (action_type::MACRO, 0),
            ButtonAction::Custom => (action_type::CUSTOM, 0),
        }
    }

    pub fn from_wire(tag: u8, code: u8) -> Self {
        match tag {
            action_type::NONE => ButtonAction::None,
            action_type::KEY => ButtonAction::Key(code),
            action_type::MEDIA => ButtonAction::Media(code),
            action_type::MACRO => ButtonAction::Macro,
            action_type::CUSTOM => ButtonAction::Custom,
            other => {
                warn!("Unknown action type 0x{:02X}, treating as none", other);
                ButtonAction::None
            }
        }
    }
}

/// `0xNN` codes written by `name()` for usages missing from the tables
fn raw_code(s: &str) -> Option<u8> {
    s.strip_prefix("0X")
        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonAction::None => f.write_str("none"),
            other => f.write_str(&other.name()),
        }
    }
}

impl From<String> for ButtonAction {
    fn from(name: String) -> Self {
        ButtonAction::from_name(&name)
    }
}

impl From<ButtonAction> for String {
    fn from(action: ButtonAction) -> Self {
        action.name()
    }
}

/// One slot's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub slot: u8,
    pub label: String,
    pub action: ButtonAction,
    pub color: Rgb,
    /// Local edits not yet confirmed by the device
    #[serde(default)]
    pub dirty: bool,
}

impl ButtonConfig {
    /// Placeholder for a slot with no configuration
    pub fn empty(slot: u8) -> Self {
        Self {
            slot,
            label: format!("Button {}", slot as u16 + 1),
            action: ButtonAction::None,
            color: Rgb::DEFAULT,
            dirty: false,
        }
    }

    /// Decode a record read from `slot`. The record's own slot byte is ignored.
    pub fn from_record(slot: u8, record: &ButtonRecord) -> Self {
        if record.slot != slot {
            warn!("Slot {} answered as slot {}", slot, record.slot);
        }
        Self {
            slot,
            label: record.label(),
            action: ButtonAction::from_wire(record.action_type, record.code),
            color: Rgb::from_bytes(record.rgb),
            dirty: false,
        }
    }

    pub fn to_record(&self) -> ButtonRecord {
        let (tag, code) = self.action.to_wire();
        ButtonRecord::new(self.slot, tag, code, self.color.to_bytes(), &self.label)
    }
}

/// Partial update for `ButtonSynchronizer::set_slot`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonPatch {
    pub label: Option<String>,
    pub action: Option<ButtonAction>,
    pub color: Option<Rgb>,
}

impl ButtonPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn action(mut self, action: ButtonAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.action.is_none() && self.color.is_none()
    }

    /// Apply to `button`. Labels are cut to what the device stores.
    pub fn apply(&self, button: &mut ButtonConfig) {
        if let Some(label) = &self.label {
            button.label = label.chars().take(button::LABEL_MAX_CHARS).collect();
        }
        if let Some(action) = self.action {
            button.action = action;
        }
        if let Some(color) = self.color {
            button.color = color;
        }
    }
}
