//! Clock sources for signing.

use chrono::{DateTime, Utc};

/// Source of the signing instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The two renderings of one signing instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SigningTime {
    /// `YYYYMMDDTHHMMSSZ`
    pub timestamp: String,
    /// `YYYYMMDD`
    pub short_date: String,
}

impl SigningTime {
    pub fn from_instant(at: DateTime<Utc>) -> Self {
        let timestamp = at.format("%Y%m%dT%H%M%SZ").to_string();
        let short_date = timestamp[..8].to_string();
        Self {
            timestamp,
            short_date,
        }
    }
}
