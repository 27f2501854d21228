use async_trait::async_trait;
use parley_signaling::{ClientId, IceCandidate, MediaConnection, MediaError, SdpKind};
use tracing::info;

/// Accepts every description and candidate and only logs them.
///
/// Lets `parley watch` drive the negotiation engine without a media stack.
#[derive(Debug, Default)]
pub struct LoggingMedia {
    /// Log full SDP bodies instead of their size.
    pub verbose: bool,
}

impl LoggingMedia {
    fn describe(&self, sdp: &str) -> String {
        if self.verbose {
            sdp.to_string()
        } else {
            format!("<{} bytes>", sdp.len())
        }
    }
}

#[async_trait]
impl MediaConnection for LoggingMedia {
    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<(), MediaError> {
        info!(%kind, sdp = %self.describe(sdp), "local description");
        Ok(())
    }

    async fn set_remote_description(
        &self,
        client_id: &ClientId,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<(), MediaError> {
        info!(peer = %client_id, %kind, sdp = %self.describe(sdp), "remote description");
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        client_id: &ClientId,
        candidate: &IceCandidate,
    ) -> Result<(), MediaError> {
        info!(
            peer = %client_id,
            mid = candidate.sdp_mid.as_deref().unwrap_or("-"),
            index = candidate.sdp_m_line_index,
            "remote candidate {}",
            candidate.candidate
        );
        Ok(())
    }
}
