//! Signing key custody
//!
//! A key store answers one question: which signing keys are authorized for a
//! key role right now. Top-level roles use their own name as key role; all
//! hash bins share the `bins` key role.

mod filesystem;
mod memory;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use repo_metadata::{Ed25519Signer, MetadataError};

pub use filesystem::FileKeyStore;
pub use memory::MemoryKeyStore;

/// Errors from key store operations
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid key file {path}: {source}")]
    InvalidKey { path: PathBuf, source: MetadataError },

    #[error("key generation failed: {0}")]
    Generate(#[from] MetadataError),

    #[error("key store lock poisoned")]
    Poisoned,
}

/// Result type for key store operations
pub type KeyResult<T> = Result<T, KeyError>;

/// Source of signing keys by key role
pub trait KeyStore: Send + Sync {
    /// Keys currently authorized for `key_role`; may be empty
    fn keys_for(&self, key_role: &str) -> KeyResult<Vec<Ed25519Signer>>;
}

impl<K: KeyStore + ?Sized> KeyStore for std::sync::Arc<K> {
    fn keys_for(&self, key_role: &str) -> KeyResult<Vec<Ed25519Signer>> {
        (**self).keys_for(key_role)
    }
}
