use serde::{Deserialize, Serialize};

/// A STUN or TURN server handed to the media layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(urls: Vec<String>, username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            urls,
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// The region's public STUN endpoint.
pub fn default_stun_url(region: &str) -> String {
    format!("stun:stun.kinesisvideo.{}.amazonaws.com:443", region)
}

/// `servers` followed by the region's STUN server, unless already listed.
pub fn ice_servers_with_default(servers: Vec<IceServer>, region: &str) -> Vec<IceServer> {
    let stun = default_stun_url(region);
    let mut servers = servers;
    if !servers.iter().any(|server| server.urls.contains(&stun)) {
        servers.push(IceServer::stun(stun));
    }
    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stun_appended() {
        let turn = IceServer::turn(
            vec!["turn:203.0.113.5:443?transport=udp".into()],
            "user",
            "pass",
        );
        let servers = ice_servers_with_default(vec![turn.clone()], "us-west-2");
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0], turn);
        assert_eq!(
            servers[1].urls,
            vec!["stun:stun.kinesisvideo.us-west-2.amazonaws.com:443".to_string()]
        );
    }

    #[test]
    fn test_default_stun_not_duplicated() {
        let servers = ice_servers_with_default(Vec::new(), "eu-west-1");
        let again = ice_servers_with_default(servers.clone(), "eu-west-1");
        assert_eq!(servers, again);
    }
}
