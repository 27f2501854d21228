//! The signaling session: one WebSocket, one task.
//!
//! The task owns the socket. It decodes inbound frames into the negotiation engine,
//! drains the engine's outbox onto the socket, and reconnects within the configured
//! lifetime budget when the transport drops. Callers interact through a
//! [`SessionHandle`] and an event receiver.

use std::sync::Arc;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parley_common::SignalingSettings;
use parley_sigv4::SignedUrl;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::USER_AGENT, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::candidate::IceCandidate;
use crate::channel::ChannelSigner;
use crate::engine::{CandidateOutcome, NegotiationEngine};
use crate::envelope::{self, SignalingEnvelope, SignalingMessage};
use crate::error::{NegotiationError, SessionError, TransportError};
use crate::media::ConnectionState;
use crate::types::{ClientId, SdpKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Things the session reports upward.
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport open; the channel is ready for signaling.
    Connected,
    /// Transport dropped. A `Reconnecting` or terminal event follows.
    Disconnected { reason: String },
    Reconnecting { attempt: u32 },
    /// A remote description was applied and its peer is established.
    RemoteSdp {
        client_id: ClientId,
        kind: SdpKind,
        sdp: String,
        flushed: usize,
    },
    RemoteCandidate {
        client_id: ClientId,
        candidate: IceCandidate,
        outcome: CandidateOutcome,
    },
    NegotiationFailed {
        client_id: ClientId,
        error: NegotiationError,
    },
    ConnectionStateChanged { state: ConnectionState },
    /// Terminal: the reconnect budget is spent or the URL can no longer be used.
    Failed { error: SessionError },
    /// Terminal: closed by the caller.
    Closed,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Failed { .. } | SessionEvent::Closed)
    }
}

/// Where connection URLs come from.
enum UrlSource {
    /// One pre-signed URL; reconnects reuse it until it expires.
    Fixed(SignedUrl),
    /// Re-sign before every attempt.
    Signer(ChannelSigner),
}

impl UrlSource {
    fn current(&self) -> Result<SignedUrl, SessionError> {
        match self {
            UrlSource::Fixed(url) => {
                if url.is_expired_at(Utc::now()) {
                    Err(SessionError::UrlExpired(url.expires_at()))
                } else {
                    Ok(url.clone())
                }
            }
            UrlSource::Signer(signer) => Ok(signer.sign()?),
        }
    }
}

pub struct SignalingSession;

impl SignalingSession {
    /// Connect with a pre-signed URL.
    ///
    /// Fails without touching the network if the URL has already expired.
    pub async fn connect(
        url: SignedUrl,
        engine: Arc<NegotiationEngine>,
        settings: SignalingSettings,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        Self::start(UrlSource::Fixed(url), engine, settings).await
    }

    /// Connect, signing a fresh URL for the first attempt and every reconnect.
    pub async fn connect_signed(
        signer: ChannelSigner,
        engine: Arc<NegotiationEngine>,
        settings: SignalingSettings,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        Self::start(UrlSource::Signer(signer), engine, settings).await
    }

    async fn start(
        source: UrlSource,
        engine: Arc<NegotiationEngine>,
        settings: SignalingSettings,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let url = source.current()?;
        let outbox = engine.take_outbox().ok_or(SessionError::EngineInUse)?;
        let ws = match open(&url, &settings).await {
            Ok(ws) => ws,
            Err(e) => {
                engine.restore_outbox(outbox);
                return Err(e.into());
            }
        };
        info!(url = %url.redacted(), role = %engine.role(), "signaling channel connected");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _ = events_tx.send(SessionEvent::Connected);

        let task = SessionTask {
            source,
            engine: engine.clone(),
            settings,
            events: events_tx.clone(),
            outbox,
            shutdown: shutdown_rx,
            reconnects_used: 0,
            unsent: None,
        };
        let task = tokio::spawn(task.run(ws));

        let handle = SessionHandle {
            engine,
            events: events_tx,
            shutdown: shutdown_tx,
            task,
        };
        Ok((handle, events_rx))
    }
}

/// Caller side of a running session. Dropping it shuts the session down.
pub struct SessionHandle {
    engine: Arc<NegotiationEngine>,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn engine(&self) -> &Arc<NegotiationEngine> {
        &self.engine
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn send_offer(&self, sdp: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.engine.apply_local_offer(sdp).await?;
        Ok(())
    }

    pub async fn send_answer(&self, sdp: &str, recipient: &ClientId) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.engine.apply_local_answer(sdp, recipient).await?;
        Ok(())
    }

    pub async fn send_ice_candidate(
        &self,
        candidate: IceCandidate,
        recipient: Option<ClientId>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.engine.send_local_candidate(candidate, recipient).await?;
        Ok(())
    }

    /// Report a media-layer connection state change.
    pub fn observe_connection_state(&self, state: ConnectionState) {
        if state.is_usable() {
            info!(%state, "media connection usable");
        } else {
            debug!(%state, "media connection state changed");
        }
        let _ = self.events.send(SessionEvent::ConnectionStateChanged { state });
    }

    /// Close the socket, discard peer state and wait for the session task to exit.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("session task ended abnormally: {}", e);
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.task.is_finished() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

enum Exit {
    Shutdown,
    Dropped(TransportError),
}

struct SessionTask {
    source: UrlSource,
    engine: Arc<NegotiationEngine>,
    settings: SignalingSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbox: mpsc::Receiver<SignalingEnvelope>,
    shutdown: watch::Receiver<bool>,
    reconnects_used: u32,
    /// Frame taken from the outbox whose write failed; retried after reconnect.
    unsent: Option<String>,
}

impl SessionTask {
    async fn run(mut self, mut ws: WsStream) {
        loop {
            match self.pump(&mut ws).await {
                Exit::Shutdown => {
                    let _ = ws.close(None).await;
                    self.engine.teardown().await;
                    info!("signaling session closed");
                    self.emit(SessionEvent::Closed);
                    return;
                }
                Exit::Dropped(error) => {
                    warn!("signaling transport dropped: {}", error);
                    self.emit(SessionEvent::Disconnected {
                        reason: error.to_string(),
                    });
                    match self.reconnect(error).await {
                        Ok(Some(next)) => ws = next,
                        Ok(None) => {
                            self.engine.teardown().await;
                            self.emit(SessionEvent::Closed);
                            return;
                        }
                        Err(error) => {
                            self.engine.teardown().await;
                            warn!("signaling session failed: {}", error);
                            self.emit(SessionEvent::Failed { error });
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Serve one connection until it drops or shutdown is requested.
    async fn pump(&mut self, ws: &mut WsStream) -> Exit {
        if let Some(frame) = self.unsent.take() {
            if let Err(e) = ws.send(Message::Text(frame.clone().into())).await {
                self.unsent = Some(frame);
                return Exit::Dropped(e.into());
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return Exit::Shutdown,
                outgoing = self.outbox.recv() => {
                    let Some(envelope) = outgoing else { return Exit::Shutdown; };
                    let frame = envelope::encode(&envelope);
                    debug!(kind = %envelope.message.message_type(), "sending signaling frame");
                    if let Err(e) = ws.send(Message::Text(frame.clone().into())).await {
                        self.unsent = Some(frame);
                        return Exit::Dropped(e.into());
                    }
                }
                incoming = ws.next() => {
                    match incoming {
                        None => return Exit::Dropped(TransportError::Closed),
                        Some(Err(e)) => return Exit::Dropped(e.into()),
                        Some(Ok(Message::Text(text))) => {
                            // Shutdown cancels an in-flight dispatch and its media call.
                            let mut shutdown = self.shutdown.clone();
                            tokio::select! {
                                _ = shutdown.changed() => return Exit::Shutdown,
                                _ = self.dispatch(text.as_str()) => {}
                            }
                        }
                        Some(Ok(Message::Close(_))) => return Exit::Dropped(TransportError::Closed),
                        Some(Ok(Message::Binary(_))) => debug!("ignoring binary signaling frame"),
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Spend the reconnect budget. `Ok(None)` means shutdown was requested meanwhile.
    async fn reconnect(&mut self, mut last_error: TransportError) -> Result<Option<WsStream>, SessionError> {
        loop {
            if self.reconnects_used >= self.settings.max_reconnect_attempts {
                return Err(SessionError::Transport(last_error));
            }
            self.reconnects_used += 1;
            let attempt = self.reconnects_used;
            info!(attempt, "reconnecting signaling channel");
            self.emit(SessionEvent::Reconnecting { attempt });

            tokio::select! {
                _ = self.shutdown.changed() => return Ok(None),
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }

            let url = self.source.current()?;
            match open(&url, &self.settings).await {
                Ok(ws) => {
                    info!(attempt, "signaling channel reconnected");
                    self.emit(SessionEvent::Connected);
                    return Ok(Some(ws));
                }
                Err(e) => {
                    warn!(attempt, "reconnect failed: {}", e);
                    last_error = e;
                }
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        let envelope = match envelope::decode(text) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!("ignoring non-signaling frame");
                return;
            }
            Err(e) => {
                warn!("dropping signaling frame: {}", e);
                return;
            }
        };

        let client_id = envelope.sender();
        match envelope.message {
            SignalingMessage::SdpOffer { sdp } => {
                self.on_remote_sdp(client_id, SdpKind::Offer, sdp).await
            }
            SignalingMessage::SdpAnswer { sdp } => {
                self.on_remote_sdp(client_id, SdpKind::Answer, sdp).await
            }
            SignalingMessage::IceCandidate(candidate) => {
                match self
                    .engine
                    .add_remote_candidate(candidate.clone(), &client_id)
                    .await
                {
                    Ok(outcome) => self.emit(SessionEvent::RemoteCandidate {
                        client_id,
                        candidate,
                        outcome,
                    }),
                    Err(error) => self.negotiation_failed(client_id, error),
                }
            }
        }
    }

    async fn on_remote_sdp(&self, client_id: ClientId, kind: SdpKind, sdp: String) {
        debug!(peer = %client_id, %kind, "received remote description");
        match self.engine.apply_remote_sdp(&sdp, &client_id, kind).await {
            Ok(flushed) => self.emit(SessionEvent::RemoteSdp {
                client_id,
                kind,
                sdp,
                flushed,
            }),
            Err(error) => self.negotiation_failed(client_id, error),
        }
    }

    fn negotiation_failed(&self, client_id: ClientId, error: NegotiationError) {
        if matches!(error, NegotiationError::Superseded) {
            return;
        }
        self.emit(SessionEvent::NegotiationFailed { client_id, error });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn open(url: &SignedUrl, settings: &SignalingSettings) -> Result<WsStream, TransportError> {
    let mut request = url.as_str().into_client_request()?;
    let agent = HeaderValue::from_str(&settings.user_agent)
        .map_err(|_| TransportError::InvalidUserAgent(settings.user_agent.clone()))?;
    request.headers_mut().insert(USER_AGENT, agent);

    let (ws, _) = tokio::time::timeout(settings.connect_timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::ConnectTimeout)??;
    Ok(ws)
}
