//! Query (read-only) command handlers.

use armdeck_device::{ButtonConfig, ConnectionManager};
use armdeck_driver::DriverConfig;

use super::{open_discovery, with_deck, CommandResult};

/// List devices in range
pub async fn scan(config: &DriverConfig, json: bool) -> CommandResult {
    let manager = ConnectionManager::new(open_discovery().await?, config.deck.clone());
    let devices = manager
        .scan(&config.device.scan_filter(), config.device.scan_duration())
        .await?;
    manager.disconnect().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No ArmDeck found");
        return Ok(());
    }
    for device in &devices {
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<20} {:>8}  {}",
            device.display_name(),
            device.info.address.as_deref().unwrap_or("-"),
            rssi,
            device.info.id
        );
    }
    Ok(())
}

/// Show device metadata
pub async fn info(config: &DriverConfig, json: bool) -> CommandResult {
    with_deck(config, |manager| async move {
        let info = manager.refresh_device_info().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&*info)?);
            return Ok(());
        }
        println!("Device:    {}", info.device_name);
        println!("Firmware:  {}", info.firmware);
        println!("Protocol:  {}", info.protocol_version);
        println!("Buttons:   {}", info.num_buttons);
        println!("Battery:   {}%", info.battery_level);
        println!("Uptime:    {}", info.uptime_display());
        println!("Free heap: {} bytes", info.free_heap_bytes);
        Ok(())
    })
    .await
}

/// Show the button configuration
pub async fn buttons(config: &DriverConfig, stored: bool, json: bool) -> CommandResult {
    with_deck(config, |manager| async move {
        let buttons = if stored {
            let stored = manager.read_stored_config().await?;
            println!("Stored configuration v{}", stored.version);
            stored.buttons
        } else {
            manager.buttons()
        };
        if json {
            println!("{}", serde_json::to_string_pretty(&buttons)?);
        } else {
            print_buttons(&buttons);
        }
        Ok(())
    })
    .await
}

pub(crate) fn print_buttons(buttons: &[ButtonConfig]) {
    println!("{:>4}  {:<8} {:<20} Color", "Slot", "Label", "Action");
    for b in buttons {
        println!(
            "{:>4}  {:<8} {:<20} {}",
            b.slot,
            b.label,
            b.action.to_string(),
            b.color.to_hex()
        );
    }
}
