//! Turning a channel endpoint into a signed connection URL.

use std::sync::Arc;

use parley_sigv4::{sign, ChannelEndpoint, Clock, Credentials, SignedUrl, SigningError, SigningRequest};

use crate::types::{LocalPeer, Role};

/// Sign the URL `local` uses to join `channel`.
///
/// Viewers put their client id in the signed query; masters do not.
pub fn establish(
    local: &LocalPeer,
    channel: &ChannelEndpoint,
    credentials: &Credentials,
    region: &str,
    clock: &dyn Clock,
) -> Result<SignedUrl, SigningError> {
    sign(&signing_request(local, channel, region)?, credentials, clock)
}

fn signing_request(
    local: &LocalPeer,
    channel: &ChannelEndpoint,
    region: &str,
) -> Result<SigningRequest, SigningError> {
    let client_id = match local.role() {
        Role::Viewer => local.client_id().map(|id| id.as_str()),
        Role::Master => None,
    };
    SigningRequest::new(
        &channel.path_and_query(client_id),
        &channel.wss_endpoint,
        region,
    )
}

/// Everything needed to re-sign a channel URL, so reconnects never reuse an
/// expired one.
#[derive(Clone)]
pub struct ChannelSigner {
    local: LocalPeer,
    channel: ChannelEndpoint,
    credentials: Credentials,
    region: String,
    clock: Arc<dyn Clock>,
    expires_secs: u64,
}

impl ChannelSigner {
    pub fn new(
        local: LocalPeer,
        channel: ChannelEndpoint,
        credentials: Credentials,
        region: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            channel,
            credentials,
            region: region.into(),
            clock,
            expires_secs: parley_common::config::DEFAULT_URL_EXPIRES_SECS,
        }
    }

    pub fn with_expires(mut self, expires_secs: u64) -> Self {
        self.expires_secs = expires_secs;
        self
    }

    pub fn local_peer(&self) -> &LocalPeer {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sign(&self) -> Result<SignedUrl, SigningError> {
        let request = signing_request(&self.local, &self.channel, &self.region)?
            .with_expires(self.expires_secs);
        sign(&request, &self.credentials, self.clock.as_ref())
    }
}

impl std::fmt::Debug for ChannelSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSigner")
            .field("local", &self.local)
            .field("channel", &self.channel)
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .field("expires_secs", &self.expires_secs)
            .finish()
    }
}
