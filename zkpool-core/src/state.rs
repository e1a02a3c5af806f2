//! Transport and protocol state machines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection transport state.
///
/// ```text
/// Opening → Opened → Closing → Closed
/// ```
///
/// Transitions only move forward; `Closed` is a sink. Any state may jump
/// straight to a later one (a failed open goes `Opening → Closed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransportState {
    /// Transport is being established.
    Opening,
    /// Transport is usable.
    Opened,
    /// Transport is shutting down.
    Closing,
    /// Transport is gone.
    Closed,
}

impl TransportState {
    /// Check if transition to next state is valid.
    pub fn can_transition_to(&self, next: TransportState) -> bool {
        next > *self
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportState::Closed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Opening => "OPENING",
            TransportState::Opened => "OPENED",
            TransportState::Closing => "CLOSING",
            TransportState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Session protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolState {
    /// No handshake sent yet.
    Anonymous,
    /// Handshake in flight.
    Connecting,
    /// Session established on this connection.
    Connected,
    /// Close-session request in flight.
    Disconnecting,
    /// Session closed cleanly.
    Disconnected,
    /// Handshake refused or protocol failure.
    Error,
}

impl ProtocolState {
    /// Whether requests may be issued.
    pub fn is_connected(&self) -> bool {
        matches!(self, ProtocolState::Connected)
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolState::Disconnected | ProtocolState::Error)
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolState::Anonymous => "ANONYMOUS",
            ProtocolState::Connecting => "CONNECTING",
            ProtocolState::Connected => "CONNECTED",
            ProtocolState::Disconnecting => "DISCONNECTING",
            ProtocolState::Disconnected => "DISCONNECTED",
            ProtocolState::Error => "ERROR",
        };
        f.write_str(name)
    }
}
