// crates/permission-gate-core/src/runtime/error.rs
// ============================================================================
// Module: Permission Service Errors
// Description: Caller-facing error taxonomy for evaluation and mutation.
// Purpose: Distinguish bad input, missing records, standing, and storage.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`PermissionError`] is the single error type returned by the service
//! facade. Store errors that mean "record missing" surface as
//! [`PermissionError::NotFound`]; everything else from storage is
//! [`PermissionError::Storage`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ValidationError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Permission service errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Input failed validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Referenced rule or restriction does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller lacks standing for the mutation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Storage failed; the operation had no effect.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for PermissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::NotFound(message),
            other => Self::Storage(other),
        }
    }
}
