//! Device interface error types

use std::time::Duration;

use armdeck_transport::protocol::cmd;
use armdeck_transport::{DecodeError, ErrorCode, ExchangeError, TransportError};
use thiserror::Error;
use uuid::Uuid;

use crate::state::ConnectionState;

/// Errors from device operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// Link-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Garbled or truncated reply
    #[error("Protocol error on {}: {source}", cmd::name(*.command))]
    Protocol { command: u8, source: DecodeError },

    /// Nothing came back, even after the re-read
    #[error("No response to {}", cmd::name(*.command))]
    NoResponse { command: u8 },

    /// Valid frame carrying a non-NONE error code
    #[error("Device rejected {}: {code}", cmd::name(*.command))]
    Device { command: u8, code: ErrorCode },

    /// Device replied with something we could not interpret
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A lifecycle stage ran out of time
    #[error("{stage} timed out after {attempts} attempt(s) of {timeout:?}")]
    StageTimeout {
        stage: ConnectionState,
        timeout: Duration,
        attempts: u32,
    },

    /// The command endpoint was not found on the device
    #[error("Required endpoint {0} missing")]
    RequiredEndpointMissing(Uuid),

    /// GET_INFO failed after the link came up
    #[error("Communication test failed: {0}")]
    CommunicationFailed(#[source] Box<DeckError>),

    /// Operation needs a fully connected session
    #[error("Cannot {operation} while {state}")]
    NotReady {
        operation: &'static str,
        state: ConnectionState,
    },

    /// Another connection attempt or operation is in progress
    #[error("Busy: {0}")]
    Busy(String),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Feature not supported by this device
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Session ended while the operation was running
    #[error("Operation cancelled")]
    Cancelled,
}

impl DeckError {
    /// Whether the session was torn down underneath the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeckError::Cancelled)
    }
}

impl From<ExchangeError> for DeckError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::Transport(e) => DeckError::Transport(e),
            ExchangeError::Encode(e) => DeckError::InvalidParameter(e.to_string()),
            ExchangeError::Protocol { command, source } => DeckError::Protocol { command, source },
            ExchangeError::NoResponse { command } => DeckError::NoResponse { command },
            ExchangeError::Device { command, code } => DeckError::Device { command, code },
            ExchangeError::UnexpectedCommand { expected, got } => DeckError::UnexpectedResponse(
                format!("expected reply to {}, got 0x{:02X}", cmd::name(expected), got),
            ),
            ExchangeError::Malformed { command, reason } => DeckError::UnexpectedResponse(
                format!("{}: {}", cmd::name(command), reason),
            ),
            ExchangeError::Busy => DeckError::Busy("command lane in use".to_string()),
            ExchangeError::Cancelled => DeckError::Cancelled,
        }
    }
}
