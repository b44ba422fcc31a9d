//! Command handlers for the CLI application.
//!
//! - `query`: read-only commands (scan, info, buttons)
//! - `buttons`: configuration commands (set, reset, test, restart, keymap)
//! - `utility`: config file

pub mod buttons;
pub mod query;
pub mod utility;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use armdeck_device::{ConnectionManager, DeckError, DeviceDiscovery};
use armdeck_driver::DriverConfig;
use tracing::warn;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Open the platform BLE stack
#[cfg(feature = "bluetooth")]
pub async fn open_discovery() -> anyhow::Result<Arc<dyn DeviceDiscovery>> {
    let discovery = armdeck_transport::bluetooth::BleDiscovery::new()
        .await
        .context("Bluetooth unavailable")?;
    Ok(Arc::new(discovery))
}

#[cfg(not(feature = "bluetooth"))]
pub async fn open_discovery() -> anyhow::Result<Arc<dyn DeviceDiscovery>> {
    anyhow::bail!("built without Bluetooth support (enable the `bluetooth` feature)")
}

/// Scan and bring the first matching deck to `FullyConnected`.
/// A failed communication test gets one retest before giving up.
pub async fn connect(config: &DriverConfig) -> anyhow::Result<ConnectionManager> {
    let manager = ConnectionManager::new(open_discovery().await?, config.deck.clone());
    let filter = config.device.scan_filter();

    eprintln!(
        "Scanning {}s for {}...",
        config.device.scan_duration().as_secs(),
        config.device.name_prefix
    );
    match manager
        .connect_first(&filter, config.device.scan_duration())
        .await
    {
        Ok(device) => {
            eprintln!("Connected to {}", device.display_name());
            Ok(manager)
        }
        Err(e @ DeckError::CommunicationFailed(_)) => {
            warn!("{}, retrying", e);
            if let Err(e) = manager.retry_communication().await {
                manager.disconnect().await;
                return Err(e).context("device is not answering");
            }
            Ok(manager)
        }
        Err(e) => Err(e).context("connection failed"),
    }
}

/// Connect, run `op`, then disconnect whatever `op` returned
pub async fn with_deck<F, Fut>(config: &DriverConfig, op: F) -> CommandResult
where
    F: FnOnce(Arc<ConnectionManager>) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let manager = Arc::new(connect(config).await?);
    let result = op(manager.clone()).await;
    manager.disconnect().await;
    result
}
