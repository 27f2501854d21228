//! Request signing for Parley signaling channels.
//!
//! This crate provides:
//! - Caller-supplied credentials with zeroize-on-drop secrets
//! - A clock abstraction so signing time can be fixed in tests
//! - Canonicalization (percent-encoding, canonical query and request)
//! - The SigV4 query-signing algorithm producing a time-limited channel URL
//! - Re-derivation of a signed URL's signature for verification
//!
//! # Design
//!
//! Signing is a pure computation: given the same request, credentials and
//! instant, [`sign_at`] produces byte-identical URLs. The only impurity is the
//! [`Clock`] read by [`sign`], and that read happens exactly once per call so the
//! `X-Amz-Date` timestamp and the credential-scope date always agree.
//!
//! The canonical request hashed into the signature is
//!
//! ```text
//! GET
//! <canonical uri>
//! <canonical query>
//! host:<host>
//!
//! host
//! <sha256 of empty payload>
//! ```
//!
//! Only the `host` header is signed; query-signed requests carry no body.

#![forbid(unsafe_code)]

pub mod canonical;
pub mod channel;
pub mod clock;
pub mod credentials;
pub mod signer;

pub use channel::ChannelEndpoint;
pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::Credentials;
pub use signer::{sign, sign_at, verify, SignedUrl, SigningError, SigningRequest};

/// Algorithm identifier carried in `X-Amz-Algorithm` and the string to sign.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
/// Terminal component of the credential scope.
pub const REQUEST_TYPE: &str = "aws4_request";
/// Service name the signaling relay verifies against.
pub const DEFAULT_SERVICE: &str = "kinesisvideo";
