//! The media-side collaborator the negotiation engine drives.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::candidate::IceCandidate;
use crate::types::{ClientId, SdpKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("description rejected: {0}")]
    Rejected(String),

    #[error("unknown peer {0}")]
    UnknownPeer(ClientId),

    #[error("media connection closed")]
    Closed,
}

/// Peer connection operations needed to complete offer/answer.
///
/// Implementations own the actual media transport. Calls for one peer arrive in
/// order: a remote description is always applied before that peer's buffered
/// candidates.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<(), MediaError>;

    async fn set_remote_description(
        &self,
        client_id: &ClientId,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<(), MediaError>;

    async fn add_ice_candidate(
        &self,
        client_id: &ClientId,
        candidate: &IceCandidate,
    ) -> Result<(), MediaError>;
}

/// ICE connection state as reported by the media layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Media can flow.
    pub fn is_usable(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Completed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Completed => "completed",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connection state {0:?}")]
pub struct UnknownConnectionState(pub String);

impl FromStr for ConnectionState {
    type Err = UnknownConnectionState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "new" => ConnectionState::New,
            "checking" => ConnectionState::Checking,
            "connected" => ConnectionState::Connected,
            "completed" => ConnectionState::Completed,
            "disconnected" => ConnectionState::Disconnected,
            "failed" => ConnectionState::Failed,
            "closed" => ConnectionState::Closed,
            other => return Err(UnknownConnectionState(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_states() {
        assert!(ConnectionState::Connected.is_usable());
        assert!(ConnectionState::Completed.is_usable());
        assert!(!ConnectionState::Checking.is_usable());
        assert!(!ConnectionState::Disconnected.is_usable());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Failed.is_terminal());
    }

    #[test]
    fn test_parse_round_trip() {
        for state in [
            ConnectionState::New,
            ConnectionState::Checking,
            ConnectionState::Connected,
            ConnectionState::Completed,
            ConnectionState::Disconnected,
            ConnectionState::Failed,
            ConnectionState::Closed,
        ] {
            assert_eq!(state.as_str().parse::<ConnectionState>(), Ok(state));
        }
        assert!("bogus".parse::<ConnectionState>().is_err());
    }
}
