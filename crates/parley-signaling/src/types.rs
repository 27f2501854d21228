use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the channel this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Channel owner; answers offers from any number of viewers.
    Master,
    /// Connects to the master and sends the offer.
    Viewer,
}

impl Role {
    /// The SDP kind this role is allowed to receive.
    pub fn accepted_remote_sdp(self) -> SdpKind {
        match self {
            Role::Master => SdpKind::Offer,
            Role::Viewer => SdpKind::Answer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// Opaque identifier of a remote peer.
///
/// The empty id names the well-known counterpart: a viewer only ever talks to the
/// master, and the relay omits the sender id on frames the master sends it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn counterpart() -> Self {
        Self(String::new())
    }

    /// A fresh random id for a viewer that was not given one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Normalize an optional wire id: absent and empty both mean the counterpart.
    pub fn from_wire(id: Option<&str>) -> Self {
        Self(id.unwrap_or_default().to_string())
    }

    pub fn is_counterpart(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_counterpart() {
            write!(f, "<counterpart>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// This endpoint's identity on the channel.
///
/// Masters are addressed by the channel alone. Viewers carry their own client id in
/// the signed URL and as the sender of every frame they write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPeer {
    role: Role,
    client_id: Option<ClientId>,
}

impl LocalPeer {
    pub fn master() -> Self {
        Self {
            role: Role::Master,
            client_id: None,
        }
    }

    /// A viewer; a random id is generated when none (or an empty one) is given.
    pub fn viewer(client_id: Option<ClientId>) -> Self {
        let client_id = client_id
            .filter(|id| !id.is_counterpart())
            .unwrap_or_else(ClientId::generate);
        Self {
            role: Role::Viewer,
            client_id: Some(client_id),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }
}
