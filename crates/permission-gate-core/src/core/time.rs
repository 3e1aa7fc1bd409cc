// crates/permission-gate-core/src/core/time.rs
// ============================================================================
// Module: Permission Gate Time Model
// Description: Canonical timestamps for grants, expiry, and audit rows.
// Purpose: Keep expiry comparisons deterministic and host-supplied.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time directly. Hosts inject a
//! [`crate::interfaces::Clock`]; every `granted_at`, `expires_at`, and audit
//! timestamp is a [`Timestamp`] in unix milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Milliseconds per second, used for duration helpers.
const MILLIS_PER_SECOND: i64 = 1_000;
/// Nanoseconds per millisecond, used for RFC 3339 conversion.
const NANOS_PER_MILLI: i128 = 1_000_000;

/// Unix-epoch timestamp in milliseconds.
///
/// # Invariants
/// - Values are supplied by callers or an injected clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

/// Errors raised when parsing timestamps.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// Input is not valid RFC 3339.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
    /// Input is outside the representable millisecond range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
}

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a timestamp shifted by `millis` (saturating).
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns a timestamp shifted by `seconds` (saturating).
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        self.plus_millis(seconds.saturating_mul(MILLIS_PER_SECOND))
    }

    /// Returns a timestamp shifted back by `seconds` (saturating).
    #[must_use]
    pub const fn minus_seconds(self, seconds: i64) -> Self {
        self.plus_millis(seconds.saturating_mul(MILLIS_PER_SECOND).saturating_neg())
    }

    /// Parses an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] when the input is malformed or out of range.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimestampError> {
        let parsed = OffsetDateTime::parse(value.trim(), &Rfc3339)
            .map_err(|err| TimestampError::Parse(err.to_string()))?;
        let millis = parsed.unix_timestamp_nanos() / NANOS_PER_MILLI;
        let millis = i64::try_from(millis)
            .map_err(|_| TimestampError::OutOfRange(value.to_string()))?;
        Ok(Self(millis))
    }

    /// Renders the timestamp as RFC 3339 when representable.
    #[must_use]
    pub fn to_rfc3339(self) -> Option<String> {
        let nanos = i128::from(self.0) * NANOS_PER_MILLI;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?.format(&Rfc3339).ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on fixed inputs.")]

    use super::Timestamp;

    #[test]
    fn rfc3339_roundtrip_preserves_millis() {
        let ts = Timestamp::parse_rfc3339("2026-01-02T03:04:05.678Z").unwrap();
        assert_eq!(ts.as_unix_millis(), 1_767_323_045_678);
        assert_eq!(Timestamp::parse_rfc3339(&ts.to_rfc3339().unwrap()).unwrap(), ts);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Timestamp::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn second_arithmetic_saturates() {
        let ts = Timestamp::from_unix_millis(i64::MAX);
        assert_eq!(ts.plus_seconds(10), ts);
        assert_eq!(Timestamp::from_unix_millis(5_000).minus_seconds(1).as_unix_millis(), 4_000);
    }
}
