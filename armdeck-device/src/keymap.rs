//! JSON keymap document for the bulk keymap endpoint
//!
//! ```json
//! {"version":1,"buttons":[{"id":0,"label":"Play","action":"MEDIA_PLAY_PAUSE","color":"#4CAF50"}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::button::{ButtonAction, ButtonConfig, ButtonPatch, Rgb};
use crate::error::DeckError;

pub const KEYMAP_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeymapEntry {
    pub id: u8,
    pub label: String,
    pub action: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeymapDocument {
    pub version: u32,
    pub buttons: Vec<KeymapEntry>,
}

impl KeymapDocument {
    pub fn from_buttons(buttons: &[ButtonConfig]) -> Self {
        Self {
            version: KEYMAP_VERSION,
            buttons: buttons
                .iter()
                .map(|b| KeymapEntry {
                    id: b.slot,
                    label: b.label.clone(),
                    action: b.action.name(),
                    color: b.color.to_hex(),
                })
                .collect(),
        }
    }

    /// Compact JSON as sent to the device
    pub fn to_bytes(&self) -> Result<Vec<u8>, DeckError> {
        serde_json::to_vec(self).map_err(|e| DeckError::InvalidParameter(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, DeckError> {
        let doc: Self = serde_json::from_str(json)
            .map_err(|e| DeckError::InvalidParameter(format!("keymap: {}", e)))?;
        if doc.version != KEYMAP_VERSION {
            return Err(DeckError::NotSupported(format!(
                "keymap version {}",
                doc.version
            )));
        }
        Ok(doc)
    }

    /// One `(slot, patch)` per entry
    pub fn patches(&self) -> Result<Vec<(u8, ButtonPatch)>, DeckError> {
        self.buttons
            .iter()
            .map(|entry| {
                let color: Rgb = entry.color.parse()?;
                Ok((
                    entry.id,
                    ButtonPatch::new()
                        .label(entry.label.clone())
                        .action(ButtonAction::from_name(&entry.action))
                        .color(color),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut play = ButtonConfig::empty(0);
        play.label = "Play".to_string();
        play.action = ButtonAction::Media(0xCD);
        play.color = Rgb::new(0x4C, 0xAF, 0x50);

        let doc = KeymapDocument::from_buttons(&[play, ButtonConfig::empty(1)]);
        let json: serde_json::Value = serde_json::from_slice(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["buttons"][0]["action"], "MEDIA_PLAY_PAUSE");
        assert_eq!(json["buttons"][0]["color"], "#4CAF50");
        assert_eq!(json["buttons"][1]["label"], "Button 2");
        assert_eq!(json["buttons"][1]["action"], "");
    }

    #[test]
    fn test_parse_and_patches() {
        let doc = KeymapDocument::from_json(
            r##"{"version":1,"buttons":[{"id":3,"label":"Mute","action":"MUTE","color":"F44336"}]}"##,
        )
        .unwrap();
        let patches = doc.patches().unwrap();
        assert_eq!(patches.len(), 1);
        let (slot, patch) = &patches[0];
        assert_eq!(*slot, 3);
        assert_eq!(patch.action, Some(ButtonAction::Media(0xE2)));
        assert_eq!(patch.color, Some(Rgb::new(0xF4, 0x43, 0x36)));
    }

    #[test]
    fn test_rejects_unknown_version() {
        assert!(matches!(
            KeymapDocument::from_json(r#"{"version":2,"buttons":[]}"#),
            Err(DeckError::NotSupported(_))
        ));
        let doc = KeymapDocument::from_json(
            r#"{"version":1,"buttons":[{"id":0,"label":"x","action":"","color":"blue"}]}"#,
        )
        .unwrap();
        assert!(doc.patches().is_err());
    }
}
