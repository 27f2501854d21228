//! SigV4 query signing for channel URLs.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use parley_sigv4::{sign_at, verify, ChannelEndpoint, Credentials, SigningRequest};
//!
//! let endpoint = ChannelEndpoint::new(
//!     "wss://v-1a2b3c4d.kinesisvideo.us-west-2.amazonaws.com",
//!     "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1",
//! );
//! let request = SigningRequest::new(
//!     &endpoint.path_and_query(None),
//!     &endpoint.wss_endpoint,
//!     "us-west-2",
//! )
//! .unwrap();
//! let creds = Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
//!
//! let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
//! let signed = sign_at(&request, &creds, at).unwrap();
//!
//! assert_eq!(signed.query_param("X-Amz-Expires"), Some("299"));
//! assert!(verify(signed.as_str(), "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY").unwrap());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parley_common::config::MAX_URL_EXPIRES_SECS;
use percent_encoding::percent_decode_str;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::canonical::{
    canonical_query, canonical_request, canonical_uri, encode_session_token, normalize_encoded,
    string_to_sign, uri_encode,
};
use crate::clock::{Clock, SigningTime};
use crate::credentials::Credentials;
use crate::{ALGORITHM, DEFAULT_SERVICE, REQUEST_TYPE};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM_PARAM: &str = "X-Amz-Algorithm";
pub const CREDENTIAL_PARAM: &str = "X-Amz-Credential";
pub const DATE_PARAM: &str = "X-Amz-Date";
pub const EXPIRES_PARAM: &str = "X-Amz-Expires";
pub const SIGNED_HEADERS_PARAM: &str = "X-Amz-SignedHeaders";
pub const SECURITY_TOKEN_PARAM: &str = "X-Amz-Security-Token";
pub const SIGNATURE_PARAM: &str = "X-Amz-Signature";

/// Signing errors. Signing does no I/O, so these only describe bad input.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("malformed url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("url has no host: {0}")]
    MissingHost(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed credential scope: {0}")]
    MalformedScope(String),

    #[error("invalid signing key")]
    InvalidKey,

    #[error("url lifetime must be within 1..={max} seconds, got {0}", max = MAX_URL_EXPIRES_SECS)]
    InvalidExpiry(u64),
}

/// One signing attempt: what to sign and where the signed URL will point.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    path_and_query: Url,
    wss_endpoint: Url,
    region: String,
    service: String,
    expires_secs: u64,
}

impl SigningRequest {
    /// `path_and_query` carries the channel parameters to sign; `wss_endpoint`
    /// supplies the scheme and host of the resulting URL.
    pub fn new(
        path_and_query: &str,
        wss_endpoint: &str,
        region: impl Into<String>,
    ) -> Result<Self, SigningError> {
        Ok(Self {
            path_and_query: parse_url(path_and_query)?,
            wss_endpoint: parse_url(wss_endpoint)?,
            region: region.into(),
            service: DEFAULT_SERVICE.to_string(),
            expires_secs: parley_common::config::DEFAULT_URL_EXPIRES_SECS,
        })
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_expires(mut self, expires_secs: u64) -> Self {
        self.expires_secs = expires_secs;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn expires_secs(&self) -> u64 {
        self.expires_secs
    }
}

/// An authenticated, time-limited channel URL.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedUrl {
    url: Url,
    signed_at: DateTime<Utc>,
    expires_secs: u64,
}

impl SignedUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn signed_at(&self) -> DateTime<Utc> {
        self.signed_at
    }

    /// Last instant the relay will accept this URL.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.signed_at + chrono::Duration::seconds(self.expires_secs as i64)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Raw (still percent-encoded) value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        raw_pairs(self.url.query().unwrap_or(""))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Query keys in URL order.
    pub fn query_keys(&self) -> Vec<&str> {
        raw_pairs(self.url.query().unwrap_or(""))
            .map(|(key, _)| key)
            .collect()
    }

    /// Scheme, host and path only; safe to log.
    pub fn redacted(&self) -> String {
        format!(
            "{}://{}{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or(""),
            self.url.path()
        )
    }
}

impl fmt::Debug for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrl")
            .field("url", &self.redacted())
            .field("signed_at", &self.signed_at)
            .field("expires_secs", &self.expires_secs)
            .finish()
    }
}

impl fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Sign `request` at the instant reported by `clock`.
pub fn sign(
    request: &SigningRequest,
    credentials: &Credentials,
    clock: &dyn Clock,
) -> Result<SignedUrl, SigningError> {
    sign_at(request, credentials, clock.now())
}

/// Sign `request` at a fixed instant. Pure: identical inputs give identical URLs.
pub fn sign_at(
    request: &SigningRequest,
    credentials: &Credentials,
    at: DateTime<Utc>,
) -> Result<SignedUrl, SigningError> {
    if let Some(field) = credentials.missing_field() {
        return Err(SigningError::MissingField(field));
    }
    if request.region.trim().is_empty() {
        return Err(SigningError::MissingField("region"));
    }
    if request.service.trim().is_empty() {
        return Err(SigningError::MissingField("service"));
    }
    if !(1..=MAX_URL_EXPIRES_SECS).contains(&request.expires_secs) {
        return Err(SigningError::InvalidExpiry(request.expires_secs));
    }

    let host = host_with_port(&request.path_and_query)?;
    let time = SigningTime::from_instant(at);
    let scope = credential_scope(&time.short_date, &request.region, &request.service);

    let mut params = BTreeMap::new();
    params.insert(ALGORITHM_PARAM.to_string(), ALGORITHM.to_string());
    params.insert(
        CREDENTIAL_PARAM.to_string(),
        uri_encode(&format!("{}/{}", credentials.access_key_id(), scope)),
    );
    params.insert(DATE_PARAM.to_string(), time.timestamp.clone());
    params.insert(EXPIRES_PARAM.to_string(), request.expires_secs.to_string());
    params.insert(SIGNED_HEADERS_PARAM.to_string(), "host".to_string());
    if let Some(token) = credentials.session_token() {
        params.insert(
            SECURITY_TOKEN_PARAM.to_string(),
            encode_session_token(token),
        );
    }
    for (key, value) in raw_pairs(request.path_and_query.query().unwrap_or("")) {
        params.insert(normalize_encoded(key), normalize_encoded(value));
    }

    let query = canonical_query(&params);
    let path = canonical_uri(request.path_and_query.path());
    let canonical = canonical_request(path, &query, &host);
    let to_sign = string_to_sign(&time.timestamp, &scope, &canonical);
    let key = derive_signing_key(
        credentials.secret_key(),
        &time.short_date,
        &request.region,
        &request.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

    let signed = format!(
        "{}://{}{}?{}&{}={}",
        request.wss_endpoint.scheme(),
        host_with_port(&request.wss_endpoint)?,
        path,
        query,
        SIGNATURE_PARAM,
        signature
    );
    let url = parse_url(&signed)?;

    debug!(
        host = %host,
        timestamp = %time.timestamp,
        expires_secs = request.expires_secs,
        "signed channel url"
    );

    Ok(SignedUrl {
        url,
        signed_at: at,
        expires_secs: request.expires_secs,
    })
}

/// Re-derive the signature of a signed URL from its own parameters and compare it
/// (in constant time) to the one it carries.
pub fn verify(signed_url: &str, secret_key: &str) -> Result<bool, SigningError> {
    let url = parse_url(signed_url)?;
    let host = host_with_port(&url)?;

    let mut params = BTreeMap::new();
    let mut presented = None;
    for (key, value) in raw_pairs(url.query().unwrap_or("")) {
        if key == SIGNATURE_PARAM {
            presented = Some(value.to_string());
        } else {
            params.insert(key.to_string(), value.to_string());
        }
    }
    let presented = presented.ok_or(SigningError::MissingField(SIGNATURE_PARAM))?;
    let timestamp = params
        .get(DATE_PARAM)
        .cloned()
        .ok_or(SigningError::MissingField(DATE_PARAM))?;
    let credential = params
        .get(CREDENTIAL_PARAM)
        .map(|value| percent_decode_str(value).decode_utf8_lossy().into_owned())
        .ok_or(SigningError::MissingField(CREDENTIAL_PARAM))?;

    // access_key_id/date/region/service/aws4_request
    let parts: Vec<&str> = credential.split('/').collect();
    if parts.len() != 5 || parts[4] != REQUEST_TYPE {
        return Err(SigningError::MalformedScope(credential.clone()));
    }
    let (short_date, region, service) = (parts[1], parts[2], parts[3]);

    let scope = credential_scope(short_date, region, service);
    let canonical = canonical_request(
        canonical_uri(url.path()),
        &canonical_query(&params),
        &host,
    );
    let to_sign = string_to_sign(&timestamp, &scope, &canonical);
    let key = derive_signing_key(secret_key, short_date, region, service)?;
    let expected = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

    Ok(parley_common::helpers::constant_time_eq(expected, presented))
}

/// `short_date/region/service/aws4_request`
pub fn credential_scope(short_date: &str, region: &str, service: &str) -> String {
    [short_date, region, service, REQUEST_TYPE].join("/")
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
pub fn derive_signing_key(
    secret_key: &str,
    short_date: &str,
    region: &str,
    service: &str,
) -> Result<[u8; 32], SigningError> {
    let k_secret = Zeroizing::new(format!("AWS4{}", secret_key));
    let k_date = hmac_sha256(k_secret.as_bytes(), short_date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, REQUEST_TYPE.as_bytes())
}

/// Hex signature of an already-built string to sign.
pub fn signature_for(
    string_to_sign: &str,
    secret_key: &str,
    short_date: &str,
    region: &str,
    service: &str,
) -> Result<String, SigningError> {
    let key = derive_signing_key(secret_key, short_date, region, service)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

fn parse_url(raw: &str) -> Result<Url, SigningError> {
    Url::parse(raw).map_err(|e| SigningError::MalformedUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn host_with_port(url: &Url) -> Result<String, SigningError> {
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SigningError::MissingHost(url.as_str().to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `key=value` pairs of a raw query; pairs without `=` are skipped.
fn raw_pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
}
