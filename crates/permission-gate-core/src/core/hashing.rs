// crates/permission-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Permission Gate Audit Hashing
// Description: Canonical JSON hashing and audit-chain digests.
// Purpose: Make the append-only audit log tamper-evident.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Audit rows are hashed over RFC 8785 (JCS) canonical JSON and chained:
//! each row's hash covers the previous row's hash plus its own payload, so
//! editing or deleting any historical row breaks every later link.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Previous-hash value used for the first row of an audit chain.
pub const AUDIT_CHAIN_GENESIS: &str = "0";

// ============================================================================
// SECTION: Hash Types
// ============================================================================

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Default hash algorithm.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Hex-encoded digest with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(bytes);
            HashDigest {
                algorithm,
                value: hex_encode(&digest),
            }
        }
    }
}

/// Computes the chained digest of `payload` following `prev_hash`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the payload cannot be
/// canonicalized.
pub fn chain_hash<T: Serialize + ?Sized>(
    prev_hash: &str,
    payload: &T,
) -> Result<HashDigest, HashError> {
    let mut combined = prev_hash.as_bytes().to_vec();
    combined.extend_from_slice(&canonical_json_bytes(payload)?);
    Ok(hash_bytes(DEFAULT_HASH_ALGORITHM, &combined))
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
