//! Common types for transport layer

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{error_code, uuids, DEVICE_NAME_PREFIX};

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Bluetooth Low Energy GATT
    Bluetooth,
    /// In-process stand-in (tests, demos)
    Simulated,
}

/// Device identification information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportDeviceInfo {
    /// Transport type
    pub transport_type: TransportType,
    /// Backend-specific peripheral identifier
    pub id: String,
    /// Hardware address if the backend exposes one
    pub address: Option<String>,
    /// Advertised name
    pub name: Option<String>,
}

/// A device seen during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub info: TransportDeviceInfo,
    /// Signal strength at discovery time
    pub rssi: Option<i16>,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    /// Display name, falling back to the identifier
    pub fn display_name(&self) -> &str {
        self.info.name.as_deref().unwrap_or(&self.info.id)
    }
}

/// Which advertisements count as ArmDeck devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFilter {
    /// Accept names starting with any of these
    pub name_prefixes: Vec<String>,
    /// Accept devices advertising any of these services
    pub services: Vec<Uuid>,
    /// Only accept this address or identifier (substring match)
    pub address: Option<String>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            name_prefixes: vec![DEVICE_NAME_PREFIX.to_string()],
            services: vec![uuids::DEVICE_INFO_SERVICE],
            address: None,
        }
    }
}

impl ScanFilter {
    /// Accept every advertisement
    pub fn any() -> Self {
        Self {
            name_prefixes: Vec::new(),
            services: Vec::new(),
            address: None,
        }
    }

    pub fn matches(&self, device: &DiscoveredDevice) -> bool {
        if let Some(wanted) = &self.address {
            let id_match = device.info.id.contains(wanted.as_str());
            let addr_match = device
                .info
                .address
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(wanted));
            if !id_match && !addr_match {
                return false;
            }
        }
        if self.name_prefixes.is_empty() && self.services.is_empty() {
            return true;
        }
        let name_match = device.info.name.as_deref().is_some_and(|name| {
            self.name_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        });
        let service_match = device.services.iter().any(|s| self.services.contains(s));
        name_match || service_match
    }
}

/// A discovered GATT service on an open link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHandle {
    pub uuid: Uuid,
}

/// Operations an endpoint supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl EndpointProperties {
    /// Read + write, as required of the command endpoint
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
        write_without_response: false,
        notify: false,
    };

    /// Write only, as exposed by the keymap endpoint
    pub const WRITE: Self = Self {
        read: false,
        write: true,
        write_without_response: false,
        notify: false,
    };
}

/// A read/write access point inside a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub service: Uuid,
    pub uuid: Uuid,
    pub properties: EndpointProperties,
}

/// Link notifications pushed by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The peripheral dropped the connection
    Disconnected,
}

/// Status carried in the first byte of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    InvalidCommand,
    InvalidParam,
    Checksum,
    Length,
    Busy,
    Memory,
    /// Unrecognised but valid code, kept verbatim
    Other(u8),
}

impl ErrorCode {
    pub fn is_ok(self) -> bool {
        self == ErrorCode::None
    }

    pub fn code(self) -> u8 {
        match self {
            ErrorCode::None => error_code::NONE,
            ErrorCode::InvalidCommand => error_code::INVALID_CMD,
            ErrorCode::InvalidParam => error_code::INVALID_PARAM,
            ErrorCode::Checksum => error_code::CHECKSUM,
            ErrorCode::Length => error_code::LENGTH,
            ErrorCode::Busy => error_code::BUSY,
            ErrorCode::Memory => error_code::MEMORY,
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        match code {
            error_code::NONE => ErrorCode::None,
            error_code::INVALID_CMD => ErrorCode::InvalidCommand,
            error_code::INVALID_PARAM => ErrorCode::InvalidParam,
            error_code::CHECKSUM => ErrorCode::Checksum,
            error_code::LENGTH => ErrorCode::Length,
            error_code::BUSY => ErrorCode::Busy,
            error_code::MEMORY => ErrorCode::Memory,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::None => write!(f, "no error"),
            ErrorCode::InvalidCommand => write!(f, "invalid command"),
            ErrorCode::InvalidParam => write!(f, "invalid parameter"),
            ErrorCode::Checksum => write!(f, "checksum error"),
            ErrorCode::Length => write!(f, "invalid length"),
            ErrorCode::Busy => write!(f, "device busy"),
            ErrorCode::Memory => write!(f, "out of memory"),
            ErrorCode::Other(code) => write!(f, "error 0x{:02X}", code),
        }
    }
}
