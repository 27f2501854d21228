//! Signaling channel endpoint description.

use crate::canonical::uri_encode;

pub const CHANNEL_ARN_PARAM: &str = "X-Amz-ChannelARN";
pub const CLIENT_ID_PARAM: &str = "X-Amz-ClientId";

/// A signaling channel as returned by the control plane: the WSS endpoint for
/// one role plus the channel ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub wss_endpoint: String,
    pub channel_arn: String,
}

impl ChannelEndpoint {
    pub fn new(wss_endpoint: impl Into<String>, channel_arn: impl Into<String>) -> Self {
        Self {
            wss_endpoint: wss_endpoint.into(),
            channel_arn: channel_arn.into(),
        }
    }

    /// The URL whose path and query get signed.
    ///
    /// Masters identify by channel only; viewers add their own client id.
    pub fn path_and_query(&self, viewer_client_id: Option<&str>) -> String {
        let base = self.wss_endpoint.trim_end_matches('?');
        let mut url = format!(
            "{}?{}={}",
            base,
            CHANNEL_ARN_PARAM,
            uri_encode(&self.channel_arn)
        );
        if let Some(client_id) = viewer_client_id {
            url.push_str(&format!("&{}={}", CLIENT_ID_PARAM, uri_encode(client_id)));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1";

    #[test]
    fn test_master_has_no_client_id() {
        let endpoint = ChannelEndpoint::new("wss://v-1234.kinesisvideo.us-west-2.amazonaws.com", ARN);
        let url = endpoint.path_and_query(None);
        assert!(url.contains("X-Amz-ChannelARN=arn%3Aaws%3Akinesisvideo"));
        assert!(!url.contains(CLIENT_ID_PARAM));
    }

    #[test]
    fn test_viewer_carries_client_id() {
        let endpoint = ChannelEndpoint::new("wss://v-1234.kinesisvideo.us-west-2.amazonaws.com", ARN);
        let url = endpoint.path_and_query(Some("viewer 7"));
        assert!(url.ends_with("&X-Amz-ClientId=viewer%207"));
    }
}
