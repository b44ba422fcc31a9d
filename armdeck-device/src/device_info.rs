//! Device metadata (GET_INFO)

use std::fmt;

use armdeck_transport::{DeviceInfoRecord, ExchangeLane, GetInfo};
use serde::Serialize;
use tracing::debug;

use crate::error::DeckError;

/// Firmware version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Snapshot of the device's metadata. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceInfo {
    pub protocol_version: u8,
    pub firmware: FirmwareVersion,
    /// 0 when the firmware did not say
    pub num_buttons: u8,
    /// 0-100
    pub battery_level: u8,
    pub uptime_seconds: u32,
    pub free_heap_bytes: u32,
    pub device_name: String,
}

impl DeviceInfo {
    pub fn from_record(record: &DeviceInfoRecord) -> Self {
        Self {
            protocol_version: record.protocol_version,
            firmware: FirmwareVersion {
                major: record.firmware_major,
                minor: record.firmware_minor,
                patch: record.firmware_patch,
            },
            num_buttons: record.num_buttons,
            battery_level: record.battery_level.min(100),
            uptime_seconds: record.uptime_seconds(),
            free_heap_bytes: record.free_heap_bytes(),
            device_name: record.device_name(),
        }
    }

    /// Issue GET_INFO on an already held lane
    pub async fn fetch(lane: &mut ExchangeLane<'_>) -> Result<Self, DeckError> {
        let record: DeviceInfoRecord = lane.query(&GetInfo).await?;
        let info = Self::from_record(&record);
        debug!(
            "Device info: fw {} protocol {} buttons {} battery {}%",
            info.firmware, info.protocol_version, info.num_buttons, info.battery_level
        );
        Ok(info)
    }

    /// Reported slot count, or `default` when the device reports none
    pub fn button_count(&self, default: u8) -> u8 {
        if self.num_buttons == 0 {
            default
        } else {
            self.num_buttons
        }
    }

    /// Uptime as `1d 02:03:04`
    pub fn uptime_display(&self) -> String {
        let s = self.uptime_seconds;
        let (days, hours, minutes, seconds) = (s / 86_400, (s / 3600) % 24, (s / 60) % 60, s % 60);
        if days > 0 {
            format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
    }
}
