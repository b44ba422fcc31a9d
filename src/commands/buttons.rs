//! Button configuration command handlers.

use std::path::Path;

use anyhow::{bail, Context};
use armdeck_device::{ButtonAction, ButtonPatch, KeymapDocument, Rgb};
use armdeck_driver::DriverConfig;

use super::query::print_buttons;
use super::{with_deck, CommandResult};

/// Change one button and save it
pub async fn set(
    config: &DriverConfig,
    slot: u8,
    label: Option<String>,
    action: Option<String>,
    color: Option<String>,
) -> CommandResult {
    let mut patch = ButtonPatch::new();
    if let Some(label) = label {
        patch = patch.label(label);
    }
    if let Some(action) = action {
        patch = patch.action(ButtonAction::from_name(&action));
    }
    if let Some(color) = color {
        patch = patch.color(color.parse::<Rgb>()?);
    }
    if patch.is_empty() {
        bail!("nothing to change: pass --label, --action or --color");
    }

    with_deck(config, |manager| async move {
        let updated = manager.set_slot(slot, patch)?;
        // Save now instead of waiting for the debounce
        manager.synchronizer().cancel_pending();
        manager.save_all().await?;
        println!(
            "Slot {}: {} {} {}",
            updated.slot,
            updated.label,
            updated.action,
            updated.color.to_hex()
        );
        Ok(())
    })
    .await
}

/// Factory reset
pub async fn reset(config: &DriverConfig) -> CommandResult {
    with_deck(config, |manager| async move {
        manager.reset().await?;
        println!("Configuration reset");
        print_buttons(&manager.buttons());
        Ok(())
    })
    .await
}

/// Fire a button's action
pub async fn test(config: &DriverConfig, slot: u8) -> CommandResult {
    with_deck(config, |manager| async move {
        manager.test_button(slot).await?;
        println!("Triggered slot {slot}");
        Ok(())
    })
    .await
}

/// Reboot the device
pub async fn restart(config: &DriverConfig) -> CommandResult {
    with_deck(config, |manager| async move {
        manager.restart().await?;
        println!("Restart sent");
        Ok(())
    })
    .await
}

/// Print, apply or upload the keymap document
pub async fn keymap(config: &DriverConfig, apply: Option<&Path>, push: bool) -> CommandResult {
    let document = match apply {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Some(KeymapDocument::from_json(&json)?)
        }
        None => None,
    };

    with_deck(config, |manager| async move {
        if let Some(document) = document {
            let saved = manager.apply_keymap(&document).await?;
            println!("Applied keymap, saved {saved} button(s)");
        } else if push {
            let chunks = manager.push_keymap().await?;
            println!("Uploaded keymap in {chunks} chunk(s)");
        } else {
            let document = manager.synchronizer().keymap();
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Ok(())
    })
    .await
}
