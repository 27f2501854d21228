//! Signaling for Parley peer sessions.
//!
//! This crate provides:
//! - The signaling wire codec (`envelope`)
//! - The per-peer offer/answer state machine with ICE candidate buffering (`engine`)
//! - The WebSocket session that connects the two to a signed channel URL (`session`)
//!
//! # Design
//!
//! Media transport is out of scope; the engine drives it through the
//! [`MediaConnection`] trait. All state is owned by one engine per session:
//! peer negotiation states live behind a single async mutex, and the session task
//! exclusively owns the socket. Outbound envelopes flow engine → outbox → session
//! task → socket, inbound frames flow socket → codec → engine, and everything the
//! caller needs to know arrives as a [`SessionEvent`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley_common::SignalingSettings;
//! use parley_signaling::{
//!     establish, LocalPeer, MediaConnection, NegotiationEngine, SessionEvent, SignalingSession,
//! };
//! use parley_sigv4::{ChannelEndpoint, Credentials, SystemClock};
//!
//! # async fn demo(media: Arc<dyn MediaConnection>) -> Result<(), Box<dyn std::error::Error>> {
//! let local = LocalPeer::viewer(None);
//! let channel = ChannelEndpoint::new(
//!     "wss://v-1a2b3c4d.kinesisvideo.us-west-2.amazonaws.com",
//!     "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1",
//! );
//! let creds = Credentials::new("AKIDEXAMPLE", "secret");
//! let url = establish(&local, &channel, &creds, "us-west-2", &SystemClock)?;
//!
//! let engine = Arc::new(NegotiationEngine::new(local, media));
//! let (session, mut events) =
//!     SignalingSession::connect(url, engine, SignalingSettings::default()).await?;
//! session.send_offer("v=0\r\n...").await?;
//!
//! while let Some(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod candidate;
pub mod channel;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod ice;
pub mod media;
pub mod session;
pub mod types;

pub use candidate::{CandidateQueue, IceCandidate};
pub use channel::{establish, ChannelSigner};
pub use engine::{CandidateOutcome, NegotiationEngine, PeerNegotiationState};
pub use envelope::{decode, encode, MessageType, SignalingEnvelope, SignalingMessage};
pub use error::{DecodeError, NegotiationError, SessionError, TransportError};
pub use ice::{default_stun_url, ice_servers_with_default, IceServer};
pub use media::{ConnectionState, MediaConnection, MediaError};
pub use session::{SessionEvent, SessionHandle, SignalingSession};
pub use types::{ClientId, LocalPeer, Role, SdpKind};
