//! Connection lifecycle states

use std::fmt;

use serde::Serialize;

/// Where a session is in its lifecycle.
///
/// ```text
/// Disconnected → Scanning → ConnectingTransport → AwaitingStabilization
///   → DiscoveringService → AcquiringEndpoints → MinimallyConnected
///   → TestingCommunication → LoadingConfiguration → FullyConnected
/// ```
///
/// Any state can drop to `ConnectionFailed` or `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    ConnectingTransport,
    AwaitingStabilization,
    DiscoveringService,
    AcquiringEndpoints,
    MinimallyConnected,
    TestingCommunication,
    LoadingConfiguration,
    FullyConnected,
    ConnectionFailed,
}

impl ConnectionState {
    /// The command endpoint is held (caller-visible "connected")
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::MinimallyConnected
                | Self::TestingCommunication
                | Self::LoadingConfiguration
                | Self::FullyConnected
        )
    }

    /// Only state in which configuration writes are allowed
    pub fn is_fully_connected(self) -> bool {
        self == Self::FullyConnected
    }

    pub fn is_scanning(self) -> bool {
        self == Self::Scanning
    }

    /// A connection attempt is running
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            Self::ConnectingTransport
                | Self::AwaitingStabilization
                | Self::DiscoveringService
                | Self::AcquiringEndpoints
                | Self::MinimallyConnected
                | Self::TestingCommunication
                | Self::LoadingConfiguration
        )
    }

    /// A new connection attempt may start from here
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Scanning | Self::ConnectionFailed
        )
    }

    /// Short status line
    pub fn description(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning for devices",
            Self::ConnectingTransport => "connecting",
            Self::AwaitingStabilization => "waiting for the link to stabilize",
            Self::DiscoveringService => "discovering services",
            Self::AcquiringEndpoints => "acquiring endpoints",
            Self::MinimallyConnected => "connected",
            Self::TestingCommunication => "testing communication",
            Self::LoadingConfiguration => "loading configuration",
            Self::FullyConnected => "ready",
            Self::ConnectionFailed => "connection failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConnectionState; 11] = [
        ConnectionState::Disconnected,
        ConnectionState::Scanning,
        ConnectionState::ConnectingTransport,
        ConnectionState::AwaitingStabilization,
        ConnectionState::DiscoveringService,
        ConnectionState::AcquiringEndpoints,
        ConnectionState::MinimallyConnected,
        ConnectionState::TestingCommunication,
        ConnectionState::LoadingConfiguration,
        ConnectionState::FullyConnected,
        ConnectionState::ConnectionFailed,
    ];

    #[test]
    fn test_projections_are_consistent() {
        for state in ALL {
            if state.is_fully_connected() {
                assert!(state.is_connected());
                assert!(!state.is_scanning());
                assert!(!state.is_connecting());
            }
            if state.is_scanning() {
                assert!(!state.is_connected());
            }
            assert_ne!(state.can_connect(), state.is_connecting() || state.is_fully_connected());
        }
    }

    #[test]
    fn test_connected_from_minimal() {
        assert!(!ConnectionState::AcquiringEndpoints.is_connected());
        assert!(ConnectionState::MinimallyConnected.is_connected());
        assert!(!ConnectionState::MinimallyConnected.is_fully_connected());
        assert!(!ConnectionState::ConnectionFailed.is_connected());
    }
}
