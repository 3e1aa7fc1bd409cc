// crates/permission-gate-core/src/core/validation.rs
// ============================================================================
// Module: Permission Gate Validation
// Description: Write-time validation errors and hard limits.
// Purpose: Reject malformed rules before anything is persisted.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every rule, restriction, and expansion intent is validated in full before
//! a transaction is opened. A [`ValidationError`] therefore guarantees that
//! nothing was written and no audit row exists for the rejected request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::InstrumentKey;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum instruments carried by a single filter or restriction.
pub const MAX_INSTRUMENTS_PER_RULE: usize = 1_024;
/// Maximum length of an instrument key.
pub const MAX_INSTRUMENT_KEY_LENGTH: usize = 64;
/// Maximum length of free-form notes and change reasons.
pub const MAX_NOTES_LENGTH: usize = 2_048;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Malformed rule, restriction, or request input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Both whitelist and blacklist were populated for one rule.
    #[error("instrument filter cannot carry both a whitelist and a blacklist")]
    ConflictingInstrumentFilter,
    /// A whitelist or blacklist was declared without instruments.
    #[error("{0} must list at least one instrument")]
    EmptyInstrumentList(&'static str),
    /// Instrument key is empty, too long, or contains whitespace.
    #[error("invalid instrument key: {0:?}")]
    InvalidInstrumentKey(String),
    /// Too many instruments for one rule.
    #[error("too many instruments: {actual} (max {max})")]
    TooManyInstruments {
        /// Maximum allowed instruments.
        max: usize,
        /// Instruments supplied.
        actual: usize,
    },
    /// `expires_at` is not in the future.
    #[error("expires_at {expires_at} is not after the current time {now}")]
    ExpiryInPast {
        /// Requested expiry.
        expires_at: Timestamp,
        /// Evaluation time of the write.
        now: Timestamp,
    },
    /// Rule targets everyone with a scope other than `all`.
    #[error("grantee everyone is only valid with scope all, got {0}")]
    EveryoneRequiresScopeAll(&'static str),
    /// Exclusion rules must be denials.
    #[error("scope exclude requires permission level deny")]
    ExcludeRequiresDeny,
    /// Priority must be zero or positive.
    #[error("priority must be non-negative, got {0}")]
    NegativePriority(i32),
    /// An expansion intent names nothing to write.
    #[error("{0} must not be empty")]
    EmptyIntent(&'static str),
    /// Expansion would exceed the configured row limit.
    #[error("expansion produces {actual} rows (max {max})")]
    TooManyRows {
        /// Maximum allowed rows.
        max: usize,
        /// Rows the intent would produce.
        actual: usize,
    },
    /// Notes or reason text exceeds the length limit.
    #[error("{field} exceeds {max} bytes")]
    TextTooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum allowed bytes.
        max: usize,
    },
    /// Unknown enum label in external input.
    #[error("unknown {field} value: {value:?}")]
    UnknownValue {
        /// Field being parsed.
        field: &'static str,
        /// Offending input.
        value: String,
    },
    /// Pagination arguments are out of range.
    #[error("invalid page: {0}")]
    InvalidPage(String),
}

// ============================================================================
// SECTION: Shared Checks
// ============================================================================

/// Validates a single instrument key.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidInstrumentKey`] for empty, overlong, or
/// whitespace-bearing keys.
pub fn validate_instrument_key(key: &InstrumentKey) -> Result<(), ValidationError> {
    let value = key.as_str();
    if value.is_empty()
        || value.len() > MAX_INSTRUMENT_KEY_LENGTH
        || value.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::InvalidInstrumentKey(value.to_string()));
    }
    Ok(())
}

/// Validates a collection of instrument keys against count and shape limits.
///
/// # Errors
///
/// Returns [`ValidationError`] when any key is invalid or the set is too large.
pub fn validate_instrument_set<'a>(
    keys: impl ExactSizeIterator<Item = &'a InstrumentKey>,
) -> Result<(), ValidationError> {
    if keys.len() > MAX_INSTRUMENTS_PER_RULE {
        return Err(ValidationError::TooManyInstruments {
            max: MAX_INSTRUMENTS_PER_RULE,
            actual: keys.len(),
        });
    }
    for key in keys {
        validate_instrument_key(key)?;
    }
    Ok(())
}

/// Validates that an optional expiry lies strictly after `now`.
///
/// # Errors
///
/// Returns [`ValidationError::ExpiryInPast`] when the expiry is not in the future.
pub fn validate_expiry(
    expires_at: Option<Timestamp>,
    now: Timestamp,
) -> Result<(), ValidationError> {
    match expires_at {
        Some(expires_at) if expires_at <= now => {
            Err(ValidationError::ExpiryInPast {
                expires_at,
                now,
            })
        }
        _ => Ok(()),
    }
}

/// Validates optional free-form text against the notes limit.
///
/// # Errors
///
/// Returns [`ValidationError::TextTooLong`] when the text exceeds the limit.
pub fn validate_text(field: &'static str, text: Option<&str>) -> Result<(), ValidationError> {
    match text {
        Some(text) if text.len() > MAX_NOTES_LENGTH => Err(ValidationError::TextTooLong {
            field,
            max: MAX_NOTES_LENGTH,
        }),
        _ => Ok(()),
    }
}
