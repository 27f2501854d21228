//! Per-peer offer/answer state machine.
//!
//! # States
//!
//! ```text
//!            remote SDP applied
//!  Pending ───────────────────────► Established
//!  (buffers candidates)             (candidates applied directly)
//! ```
//!
//! A peer enters `Pending` the first time any message names it. It is promoted only
//! after the media layer accepts its remote description, and promotion flushes the
//! buffered candidates in arrival order while still holding the peer lock, so no
//! fresh candidate can overtake a buffered one.
//!
//! Teardown bumps a generation counter before clearing the table. Every operation
//! records the generation it started under and re-checks it after each await; a
//! stale operation returns [`NegotiationError::Superseded`] without touching state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parley_common::SignalingSettings;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::candidate::{CandidateQueue, IceCandidate};
use crate::envelope::{SignalingEnvelope, SignalingMessage};
use crate::error::NegotiationError;
use crate::media::MediaConnection;
use crate::types::{ClientId, LocalPeer, Role, SdpKind};

/// Negotiation progress for one remote peer.
#[derive(Debug, Clone)]
pub enum PeerNegotiationState {
    Pending(CandidateQueue),
    Established,
}

impl PeerNegotiationState {
    pub fn is_established(&self) -> bool {
        matches!(self, PeerNegotiationState::Established)
    }

    /// Candidates waiting for the remote description.
    pub fn buffered(&self) -> usize {
        match self {
            PeerNegotiationState::Pending(queue) => queue.len(),
            PeerNegotiationState::Established => 0,
        }
    }
}

/// What happened to a remote candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Handed to the media layer.
    Applied,
    /// Held until the peer's remote description is applied.
    Buffered,
    /// Equal to a candidate already buffered; dropped.
    Duplicate,
}

#[derive(Debug, Default)]
struct PeerTable {
    peers: HashMap<ClientId, PeerNegotiationState>,
    /// Most recent named remote peer; the default recipient for a master's candidates.
    last_remote: Option<ClientId>,
}

impl PeerTable {
    fn touch(&mut self, client_id: &ClientId) -> &mut PeerNegotiationState {
        if !client_id.is_counterpart() {
            self.last_remote = Some(client_id.clone());
        }
        self.peers
            .entry(client_id.clone())
            .or_insert_with(|| PeerNegotiationState::Pending(CandidateQueue::new()))
    }
}

pub struct NegotiationEngine {
    local: LocalPeer,
    media: Arc<dyn MediaConnection>,
    peers: Mutex<PeerTable>,
    generation: AtomicU64,
    outbox: mpsc::Sender<SignalingEnvelope>,
    outbox_rx: std::sync::Mutex<Option<mpsc::Receiver<SignalingEnvelope>>>,
}

impl NegotiationEngine {
    pub fn new(local: LocalPeer, media: Arc<dyn MediaConnection>) -> Self {
        Self::with_settings(local, media, &SignalingSettings::default())
    }

    pub fn with_settings(
        local: LocalPeer,
        media: Arc<dyn MediaConnection>,
        settings: &SignalingSettings,
    ) -> Self {
        let (outbox, outbox_rx) = mpsc::channel(settings.outbox_capacity.max(1));
        Self {
            local,
            media,
            peers: Mutex::new(PeerTable::default()),
            generation: AtomicU64::new(0),
            outbox,
            outbox_rx: std::sync::Mutex::new(Some(outbox_rx)),
        }
    }

    pub fn role(&self) -> Role {
        self.local.role()
    }

    pub fn local_peer(&self) -> &LocalPeer {
        &self.local
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Receiving end of the outbound envelope queue. Yields `Some` exactly once;
    /// whoever holds it owns the transport side of this engine.
    pub fn take_outbox(&self) -> Option<mpsc::Receiver<SignalingEnvelope>> {
        self.outbox_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Give back an outbox whose session never started.
    pub(crate) fn restore_outbox(&self, outbox: mpsc::Receiver<SignalingEnvelope>) {
        if let Ok(mut slot) = self.outbox_rx.lock() {
            slot.get_or_insert(outbox);
        }
    }

    /// Set our offer on the media layer and queue it for the master.
    pub async fn apply_local_offer(&self, sdp: &str) -> Result<(), NegotiationError> {
        self.apply_local(SdpKind::Offer, sdp, None).await
    }

    /// Set our answer on the media layer and queue it for `recipient`.
    pub async fn apply_local_answer(
        &self,
        sdp: &str,
        recipient: &ClientId,
    ) -> Result<(), NegotiationError> {
        self.apply_local(SdpKind::Answer, sdp, Some(recipient.clone()))
            .await
    }

    async fn apply_local(
        &self,
        kind: SdpKind,
        sdp: &str,
        recipient: Option<ClientId>,
    ) -> Result<(), NegotiationError> {
        // A viewer offers, a master answers.
        if self.role().accepted_remote_sdp() == kind {
            return Err(NegotiationError::WrongRole(self.role(), kind));
        }
        let generation = self.generation();

        self.media
            .set_local_description(kind, sdp)
            .await
            .map_err(|source| NegotiationError::LocalDescription { kind, source })?;
        self.ensure_current(generation)?;

        let envelope = SignalingEnvelope::new(SignalingMessage::sdp(kind, sdp))
            .with_sender(self.local.client_id().cloned())
            .with_recipient(recipient);
        debug!(%kind, "queued local description");
        self.enqueue(envelope).await
    }

    /// Queue a locally gathered candidate.
    ///
    /// A master addresses `recipient`, falling back to the last viewer heard from.
    /// A viewer always addresses the master and ignores `recipient`.
    pub async fn send_local_candidate(
        &self,
        candidate: IceCandidate,
        recipient: Option<ClientId>,
    ) -> Result<(), NegotiationError> {
        let envelope = SignalingEnvelope::new(SignalingMessage::IceCandidate(candidate));
        let envelope = match self.role() {
            Role::Viewer => envelope.with_sender(self.local.client_id().cloned()),
            Role::Master => {
                let recipient = match recipient.filter(|id| !id.is_counterpart()) {
                    Some(id) => id,
                    None => self
                        .peers
                        .lock()
                        .await
                        .last_remote
                        .clone()
                        .ok_or(NegotiationError::NoRecipient)?,
                };
                envelope.with_recipient(Some(recipient))
            }
        };
        self.enqueue(envelope).await
    }

    /// Apply a remote description from `client_id`.
    ///
    /// On success the peer becomes `Established` and its buffered candidates are
    /// applied in arrival order; returns how many were applied. On failure the peer
    /// stays `Pending` with its buffer intact.
    pub async fn apply_remote_sdp(
        &self,
        sdp: &str,
        client_id: &ClientId,
        kind: SdpKind,
    ) -> Result<usize, NegotiationError> {
        let generation = self.generation();
        let mut table = self.peers.lock().await;
        self.ensure_current(generation)?;
        table.touch(client_id);

        if kind != self.role().accepted_remote_sdp() {
            warn!(role = %self.role(), %kind, peer = %client_id, "rejecting remote description");
            return Err(NegotiationError::UnexpectedSdp {
                role: self.role(),
                kind,
                client_id: client_id.clone(),
            });
        }

        let applied = self.media.set_remote_description(client_id, kind, sdp).await;
        self.ensure_current(generation)?;
        if let Err(source) = applied {
            warn!(peer = %client_id, %kind, "remote description rejected: {}", source);
            return Err(NegotiationError::RemoteDescription {
                kind,
                client_id: client_id.clone(),
                source,
            });
        }

        let buffered = match table
            .peers
            .insert(client_id.clone(), PeerNegotiationState::Established)
        {
            Some(PeerNegotiationState::Pending(mut queue)) => queue.drain(),
            _ => Vec::new(),
        };

        let mut flushed = 0;
        for candidate in &buffered {
            match self.media.add_ice_candidate(client_id, candidate).await {
                Ok(()) => flushed += 1,
                Err(e) => warn!(peer = %client_id, "buffered candidate rejected: {}", e),
            }
            self.ensure_current(generation)?;
        }

        info!(
            peer = %client_id,
            %kind,
            flushed,
            "peer established"
        );
        Ok(flushed)
    }

    /// Apply or buffer a remote candidate from `client_id`.
    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
        client_id: &ClientId,
    ) -> Result<CandidateOutcome, NegotiationError> {
        let generation = self.generation();
        let mut table = self.peers.lock().await;
        self.ensure_current(generation)?;

        match table.touch(client_id) {
            PeerNegotiationState::Established => {
                let applied = self.media.add_ice_candidate(client_id, &candidate).await;
                self.ensure_current(generation)?;
                applied.map_err(|source| NegotiationError::Candidate {
                    client_id: client_id.clone(),
                    source,
                })?;
                debug!(peer = %client_id, "applied remote candidate");
                Ok(CandidateOutcome::Applied)
            }
            PeerNegotiationState::Pending(queue) => {
                if queue.push(candidate) {
                    debug!(peer = %client_id, buffered = queue.len(), "buffered remote candidate");
                    Ok(CandidateOutcome::Buffered)
                } else {
                    debug!(peer = %client_id, "dropped duplicate candidate");
                    Ok(CandidateOutcome::Duplicate)
                }
            }
        }
    }

    /// Snapshot of one peer's state.
    pub async fn peer_state(&self, client_id: &ClientId) -> Option<PeerNegotiationState> {
        self.peers.lock().await.peers.get(client_id).cloned()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.peers.len()
    }

    /// Discard all peer state. Operations already in flight finish as `Superseded`.
    pub async fn teardown(&self) {
        let previous = self.generation.fetch_add(1, Ordering::SeqCst);
        let mut table = self.peers.lock().await;
        let discarded = table.peers.len();
        *table = PeerTable::default();
        info!(generation = previous + 1, discarded, "negotiation state torn down");
    }

    fn ensure_current(&self, generation: u64) -> Result<(), NegotiationError> {
        if self.generation() == generation {
            Ok(())
        } else {
            Err(NegotiationError::Superseded)
        }
    }

    async fn enqueue(&self, envelope: SignalingEnvelope) -> Result<(), NegotiationError> {
        self.outbox
            .send(envelope)
            .await
            .map_err(|_| NegotiationError::OutboxClosed)
    }
}
