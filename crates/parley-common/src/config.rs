use std::time::Duration;

use crate::error::{Error, Result};
use crate::helpers::env_parse;

/// Lifetime of a signed channel URL, in seconds.
pub const DEFAULT_URL_EXPIRES_SECS: u64 = 299;
/// The relay rejects presigned URLs that live longer than five minutes.
pub const MAX_URL_EXPIRES_SECS: u64 = 300;
/// Automatic reconnects allowed over the lifetime of one session.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 2;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OUTBOX_CAPACITY: usize = 128;

/// Tunables shared by the signer and the signaling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingSettings {
    pub url_expires_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub outbox_capacity: usize,
}

impl SignalingSettings {
    /// Build settings from `PARLEY_*` environment variables, using defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            url_expires_secs: env_parse("PARLEY_URL_EXPIRES_SECS", defaults.url_expires_secs)?,
            max_reconnect_attempts: env_parse(
                "PARLEY_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            reconnect_delay: Duration::from_millis(env_parse(
                "PARLEY_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )?),
            connect_timeout: Duration::from_secs(env_parse(
                "PARLEY_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            user_agent: std::env::var("PARLEY_USER_AGENT").unwrap_or(defaults.user_agent),
            outbox_capacity: env_parse("PARLEY_OUTBOX_CAPACITY", defaults.outbox_capacity)?,
        };
        settings.validate()?;
        tracing::debug!(?settings, "loaded signaling settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_URL_EXPIRES_SECS).contains(&self.url_expires_secs) {
            return Err(Error::config(format!(
                "url_expires_secs must be within 1..={}, got {}",
                MAX_URL_EXPIRES_SECS, self.url_expires_secs
            )));
        }
        if self.outbox_capacity == 0 {
            return Err(Error::config("outbox_capacity must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            url_expires_secs: DEFAULT_URL_EXPIRES_SECS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: format!("parley/{}", env!("CARGO_PKG_VERSION")),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SignalingSettings::default();
        assert_eq!(settings.url_expires_secs, 299);
        assert_eq!(settings.max_reconnect_attempts, 2);
        assert!(settings.user_agent.starts_with("parley/"));
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_overlong_expiry() {
        let settings = SignalingSettings {
            url_expires_secs: 3600,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
