//! Driver configuration file
//!
//! TOML, by default at `~/.config/armdeck/armdeck.toml`:
//!
//! ```toml
//! [device]
//! name_prefix = "ArmDeck"
//! scan_seconds = 5
//!
//! [deck.timing]
//! stabilization_ms = 3000
//!
//! [deck.protocol]
//! reset_opcode = 0x52
//! ```
//!
//! Every key is optional; missing keys keep their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use armdeck_device::DeckSettings;
use armdeck_transport::protocol::{uuids, DEVICE_NAME_PREFIX};
use armdeck_transport::ScanFilter;
use serde::{Deserialize, Serialize};

/// Which device to look for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Advertised name prefix
    pub name_prefix: String,
    /// Only connect to this address / peripheral id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// How long a scan runs
    pub scan_seconds: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name_prefix: DEVICE_NAME_PREFIX.to_string(),
            address: None,
            scan_seconds: 5,
        }
    }
}

impl DeviceSection {
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            name_prefixes: vec![self.name_prefix.clone()],
            services: vec![uuids::DEVICE_INFO_SERVICE],
            address: self.address.clone(),
        }
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_seconds.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub device: DeviceSection,
    pub deck: DeckSettings,
}

impl DriverConfig {
    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("armdeck")
            .join("armdeck.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
