//! Common error types for Parley.

use thiserror::Error;

/// Result type alias using Parley's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised while loading shared configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Environment variable present but not parseable
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    pub(crate) fn invalid_env(name: &str, value: &str) -> Self {
        Self::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}
