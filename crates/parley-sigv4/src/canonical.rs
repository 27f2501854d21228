//! Canonical forms hashed into the signature.
//!
//! Any byte of difference here between us and the relay breaks authentication,
//! so everything is built from explicit strings rather than URL library output.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::ALGORITHM;

/// Everything outside the RFC 3986 unreserved set (`A-Z a-z 0-9 - . _ ~`).
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Hex SHA-256 of the empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Percent-encode a query key or value.
pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Encode a value that may already carry percent escapes.
///
/// Escapes are decoded first so that encoding is idempotent: a channel ARN passed
/// raw (`arn:aws:...`) and one passed pre-encoded (`arn%3Aaws%3A...`) canonicalize
/// to the same bytes.
pub fn normalize_encoded(value: &str) -> String {
    uri_encode(&percent_decode_str(value).decode_utf8_lossy())
}

/// Encode a session token.
///
/// `+` and `=` are common in tokens and must arrive as `%2B`/`%3D`; the
/// unreserved set already guarantees that.
pub fn encode_session_token(token: &str) -> String {
    uri_encode(token)
}

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// `key=value&...` with keys in lexicographic order. Inputs are already encoded.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// The canonical URI: the request path, or `/` when empty.
pub fn canonical_uri(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Canonical request for a body-less GET signed over the `host` header only.
pub fn canonical_request(uri: &str, query: &str, host: &str) -> String {
    format!(
        "GET\n{uri}\n{query}\nhost:{host}\n\nhost\n{EMPTY_PAYLOAD_SHA256}",
        uri = canonical_uri(uri),
    )
}

pub fn string_to_sign(timestamp: &str, credential_scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{timestamp}\n{credential_scope}\n{}",
        sha256_hex(canonical_request)
    )
}
