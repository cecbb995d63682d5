//! Error types for metadata handling.

use thiserror::Error;

/// Errors from parsing, canonicalizing, signing or verifying metadata
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JCS canonicalization error: {0}")]
    Canonicalization(String),

    #[error("metadata type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unsupported key type: {keytype}/{scheme}")]
    UnsupportedKey { keytype: String, scheme: String },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid delegation: {0}")]
    InvalidDelegation(String),

    #[error("invalid target file {path}: {reason}")]
    InvalidTarget { path: String, reason: String },
}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;
