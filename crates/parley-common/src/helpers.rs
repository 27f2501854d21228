//! Common helper functions for Parley.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Performs a constant-time comparison of two byte strings.
/// Used when checking a re-derived request signature against a presented one.
pub fn constant_time_eq(a: impl AsRef<[u8]>, b: impl AsRef<[u8]>) -> bool {
    let a_bytes = a.as_ref();
    let b_bytes = b.as_ref();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    let mut diff = 0u8;
    for (lhs, rhs) in a_bytes.iter().zip(b_bytes.iter()) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}

/// Reads and parses an environment variable, falling back to `default` when unset.
///
/// A variable that is set but does not parse is an error rather than a silent default.
pub fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| Error::invalid_env(name, &value)),
        Err(_) => Ok(default),
    }
}
