//! Error types for the signaling session.
//!
//! Decode and negotiation errors are per message: the session logs or reports them
//! and keeps running. Transport errors feed the reconnect budget. Only
//! [`SessionError`] is returned to callers of the session API.

use parley_sigv4::SigningError;
use thiserror::Error;

use crate::media::MediaError;
use crate::types::{ClientId, Role, SdpKind};

/// A text frame that could not be turned into a signaling envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Frame(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame missing field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported message type {0:?}")]
    UnsupportedMessageType(String),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    PayloadNotUtf8,

    #[error("payload has unexpected shape: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Failure to apply a signaling message to a peer.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("{role} does not accept a remote {kind} (from {client_id})")]
    UnexpectedSdp {
        role: Role,
        kind: SdpKind,
        client_id: ClientId,
    },

    #[error("media rejected remote {kind} from {client_id}: {source}")]
    RemoteDescription {
        kind: SdpKind,
        client_id: ClientId,
        #[source]
        source: MediaError,
    },

    #[error("media rejected local {kind}: {source}")]
    LocalDescription {
        kind: SdpKind,
        #[source]
        source: MediaError,
    },

    #[error("media rejected candidate from {client_id}: {source}")]
    Candidate {
        client_id: ClientId,
        #[source]
        source: MediaError,
    },

    #[error("{0} cannot send an {1}")]
    WrongRole(Role, SdpKind),

    #[error("no remote peer known to address")]
    NoRecipient,

    #[error("negotiation superseded by session teardown")]
    Superseded,

    #[error("session outbox closed")]
    OutboxClosed,
}

/// WebSocket transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("user agent is not a valid header value: {0:?}")]
    InvalidUserAgent(String),

    #[error("connection closed by relay")]
    Closed,
}

/// Errors returned by the session API.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("negotiation engine is already bound to a session")]
    EngineInUse,

    #[error("signed url expired at {0}")]
    UrlExpired(chrono::DateTime<chrono::Utc>),

    #[error("session closed")]
    Closed,
}

impl SessionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionError::Closed)
    }
}
