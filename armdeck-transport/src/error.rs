//! Transport, codec and exchange error types

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::cmd;
use crate::types::ErrorCode;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("Endpoint {0} does not support {1}")]
    Unsupported(Uuid, &'static str),

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "bluetooth")]
impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound("peripheral".into()),
            btleplug::Error::NotConnected => TransportError::Disconnected,
            btleplug::Error::TimedOut(_) => TransportError::Timeout,
            other => TransportError::Bluetooth(other.to_string()),
        }
    }
}

/// Frame encoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Payload of {len} bytes exceeds the 255 byte frame limit")]
    PayloadTooLong { len: usize },
}

/// Frame decoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No frame marker in {len} bytes")]
    NoMagic { len: usize },

    #[error("Frame too short: {len} bytes after marker")]
    TooShort { len: usize },

    #[error("Truncated body: declared {declared} bytes, {available} available")]
    TruncatedBody { declared: usize, available: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Failure of one command exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Protocol error on {}: {source}", cmd::name(*.command))]
    Protocol { command: u8, source: DecodeError },

    #[error("No response to {}", cmd::name(*.command))]
    NoResponse { command: u8 },

    #[error("Device rejected {}: {code}", cmd::name(*.command))]
    Device { command: u8, code: ErrorCode },

    #[error("Expected reply to {}, got 0x{got:02X}", cmd::name(*.expected))]
    UnexpectedCommand { expected: u8, got: u8 },

    #[error("Malformed {} payload: {reason}", cmd::name(*.command))]
    Malformed { command: u8, reason: String },

    #[error("Command lane busy")]
    Busy,

    #[error("Exchange cancelled")]
    Cancelled,
}
