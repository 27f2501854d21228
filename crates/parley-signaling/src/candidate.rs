//! ICE candidates and the per-peer pending buffer.

use serde::{Deserialize, Serialize};

/// One connectivity candidate as carried in an `ICE_CANDIDATE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: u32,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, sdp_m_line_index: u32) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_m_line_index,
        }
    }
}

/// Insertion-ordered set of candidates awaiting a remote description.
///
/// Candidates are compared structurally; a repeat of one already queued is dropped.
#[derive(Debug, Clone, Default)]
pub struct CandidateQueue {
    items: Vec<IceCandidate>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `candidate`. Returns `false` if an equal candidate is already queued.
    pub fn push(&mut self, candidate: IceCandidate) -> bool {
        if self.items.contains(&candidate) {
            return false;
        }
        self.items.push(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IceCandidate> {
        self.items.iter()
    }

    /// Empty the queue, yielding candidates in arrival order.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.items)
    }
}
