//! Signaling wire format.
//!
//! Outbound frame:
//!
//! ```text
//! {"action":"SDP_OFFER","messagePayload":"<base64 json>","recipientClientId":"..","senderClientId":".."}
//! ```
//!
//! Inbound frames name the type in `messageType` (some relays reuse `action`). The
//! payload is base64 of `{"type":"offer","sdp":".."}` or
//! `{"candidate":"..","sdpMid":"0","sdpMLineIndex":0}`. Peers in the wild send the
//! payload JSON escaped a second time and quoted, and sometimes strip base64
//! padding; decoding accepts all of these.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::candidate::IceCandidate;
use crate::error::DecodeError;
use crate::types::{ClientId, SdpKind};

const ACTION_KEY: &str = "action";
const MESSAGE_TYPE_KEY: &str = "messageType";
const PAYLOAD_KEY: &str = "messagePayload";
const RECIPIENT_KEY: &str = "recipientClientId";
const SENDER_KEY: &str = "senderClientId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SdpOffer,
    SdpAnswer,
    IceCandidate,
}

impl MessageType {
    pub fn as_wire(self) -> &'static str {
        match self {
            MessageType::SdpOffer => "SDP_OFFER",
            MessageType::SdpAnswer => "SDP_ANSWER",
            MessageType::IceCandidate => "ICE_CANDIDATE",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "SDP_OFFER" => Some(MessageType::SdpOffer),
            "SDP_ANSWER" => Some(MessageType::SdpAnswer),
            "ICE_CANDIDATE" => Some(MessageType::IceCandidate),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    SdpOffer { sdp: String },
    SdpAnswer { sdp: String },
    IceCandidate(IceCandidate),
}

impl SignalingMessage {
    pub fn sdp(kind: SdpKind, sdp: impl Into<String>) -> Self {
        match kind {
            SdpKind::Offer => SignalingMessage::SdpOffer { sdp: sdp.into() },
            SdpKind::Answer => SignalingMessage::SdpAnswer { sdp: sdp.into() },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            SignalingMessage::SdpOffer { .. } => MessageType::SdpOffer,
            SignalingMessage::SdpAnswer { .. } => MessageType::SdpAnswer,
            SignalingMessage::IceCandidate(_) => MessageType::IceCandidate,
        }
    }
}

/// One signaling message plus its routing ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEnvelope {
    pub message: SignalingMessage,
    pub sender_client_id: Option<ClientId>,
    pub recipient_client_id: Option<ClientId>,
}

impl SignalingEnvelope {
    pub fn new(message: SignalingMessage) -> Self {
        Self {
            message,
            sender_client_id: None,
            recipient_client_id: None,
        }
    }

    pub fn with_sender(mut self, sender: Option<ClientId>) -> Self {
        self.sender_client_id = sender.filter(|id| !id.is_counterpart());
        self
    }

    pub fn with_recipient(mut self, recipient: Option<ClientId>) -> Self {
        self.recipient_client_id = recipient.filter(|id| !id.is_counterpart());
        self
    }

    /// The peer this inbound envelope came from; absent senders are the counterpart.
    pub fn sender(&self) -> ClientId {
        ClientId::from_wire(self.sender_client_id.as_ref().map(ClientId::as_str))
    }
}

/// `{"type":..,"sdp":..}`; the type is implied by the envelope and ignored.
#[derive(Debug, Deserialize)]
struct SdpPayload {
    sdp: String,
}

/// Render an envelope as a text frame.
pub fn encode(envelope: &SignalingEnvelope) -> String {
    let payload = match &envelope.message {
        SignalingMessage::SdpOffer { sdp } => json!({ "type": "offer", "sdp": sdp }),
        SignalingMessage::SdpAnswer { sdp } => json!({ "type": "answer", "sdp": sdp }),
        SignalingMessage::IceCandidate(candidate) => {
            let mut payload = json!({
                "candidate": candidate.candidate,
                "sdpMLineIndex": candidate.sdp_m_line_index,
            });
            // sdpMid is a string on the wire; omit it when absent.
            if let Some(mid) = &candidate.sdp_mid {
                payload["sdpMid"] = Value::from(mid.as_str());
            }
            payload
        }
    };

    let mut frame = Map::new();
    frame.insert(
        ACTION_KEY.to_string(),
        Value::from(envelope.message.message_type().as_wire()),
    );
    frame.insert(
        PAYLOAD_KEY.to_string(),
        Value::from(STANDARD.encode(payload.to_string())),
    );
    if let Some(recipient) = &envelope.recipient_client_id {
        frame.insert(RECIPIENT_KEY.to_string(), Value::from(recipient.as_str()));
    }
    if let Some(sender) = &envelope.sender_client_id {
        frame.insert(SENDER_KEY.to_string(), Value::from(sender.as_str()));
    }
    Value::Object(frame).to_string()
}

/// Parse a text frame.
///
/// `Ok(None)` means the frame is not a signaling message (fewer than two top-level
/// keys, e.g. a bare status ping) and should be ignored.
pub fn decode(frame: &str) -> Result<Option<SignalingEnvelope>, DecodeError> {
    let value: Value = serde_json::from_str(frame).map_err(DecodeError::Frame)?;
    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };
    if object.len() < 2 {
        return Ok(None);
    }

    let type_name = object
        .get(MESSAGE_TYPE_KEY)
        .or_else(|| object.get(ACTION_KEY))
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField(MESSAGE_TYPE_KEY))?;
    let message_type = MessageType::from_wire(type_name)
        .ok_or_else(|| DecodeError::UnsupportedMessageType(type_name.to_string()))?;

    let raw_payload = object
        .get(PAYLOAD_KEY)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField(PAYLOAD_KEY))?;
    let payload = decode_payload_text(raw_payload)?;

    let message = match message_type {
        MessageType::SdpOffer => SignalingMessage::SdpOffer {
            sdp: parse_payload::<SdpPayload>(&payload)?.sdp,
        },
        MessageType::SdpAnswer => SignalingMessage::SdpAnswer {
            sdp: parse_payload::<SdpPayload>(&payload)?.sdp,
        },
        MessageType::IceCandidate => {
            SignalingMessage::IceCandidate(parse_payload::<IceCandidate>(&payload)?)
        }
    };

    Ok(Some(SignalingEnvelope {
        message,
        sender_client_id: optional_id(&object, SENDER_KEY),
        recipient_client_id: optional_id(&object, RECIPIENT_KEY),
    }))
}

/// Non-string or empty ids are treated as absent.
fn optional_id(object: &Map<String, Value>, key: &str) -> Option<ClientId> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ClientId::from)
}

/// Undo one layer of textual JSON escaping.
fn unescape(text: &str) -> String {
    text.replace("\\\\", "\\").replace("\\\"", "\"")
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}

fn decode_payload_text(raw: &str) -> Result<String, DecodeError> {
    let cleaned = unescape(raw);
    let encoded = strip_quotes(&cleaned);

    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD
            .decode(format!("{}==", encoded))
            .or_else(|_| STANDARD.decode(format!("{}=", encoded)))
            .map_err(DecodeError::Base64)?,
    };
    String::from_utf8(bytes).map_err(|_| DecodeError::PayloadNotUtf8)
}

/// Parse the payload JSON, peeling off a second layer of escaping when present.
fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    let first_error = match serde_json::from_str::<T>(text) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    if let Ok(inner) = serde_json::from_str::<String>(text) {
        if let Ok(parsed) = serde_json::from_str::<T>(&inner) {
            return Ok(parsed);
        }
    }

    let cleaned = unescape(text);
    serde_json::from_str::<T>(strip_quotes(&cleaned)).map_err(|_| DecodeError::Payload(first_error))
}
