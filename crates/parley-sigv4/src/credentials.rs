//! Caller-supplied signing credentials.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Long-term or temporary credentials used to sign a channel URL.
///
/// Never persisted. The secret key and session token are wiped on drop and
/// redacted from `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    access_key_id: String,
    secret_key: String,
    session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token (temporary credentials). Empty tokens are ignored.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Name of the first required field that is empty, if any.
    pub(crate) fn missing_field(&self) -> Option<&'static str> {
        if self.access_key_id.trim().is_empty() {
            Some("access_key_id")
        } else if self.secret_key.is_empty() {
            Some("secret_key")
        } else {
            None
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
