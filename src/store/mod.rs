//! Persistence of role metadata
//!
//! Stores keep every version of every role side by side ("consistent
//! snapshot"): each document lives under `<version>.<role>.json`, except
//! timestamp which always lives under the single name `timestamp.json`.
//!
//! Writes are optimistic: the caller states which version it read, and the
//! store refuses the write if another writer got there first.

mod filesystem;
mod lock;
mod memory;

use std::io;
use std::time::Duration;

use thiserror::Error;

use repo_metadata::TIMESTAMP;

pub use filesystem::FileStore;
pub use lock::{LockError, LockResult, RoleLock};
pub use memory::MemoryStore;

/// Errors from metadata store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata not found: {role}")]
    NotFound { role: String },

    #[error("metadata not found: {role} version {version}")]
    VersionNotFound { role: String, version: u64 },

    #[error(
        "version conflict on {role}: expected current {expected:?}, found {actual:?} (writing {version})"
    )]
    VersionConflict {
        role: String,
        version: u64,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("invalid role name: {0}")]
    InvalidRoleName(String),

    #[error("lock timeout after {0:?}")]
    LockTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<LockError> for StoreError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout(timeout) => StoreError::LockTimeout(timeout),
            LockError::Io(e) => StoreError::Io(e),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed, versioned storage for serialized role metadata
pub trait MetadataStore: Send + Sync {
    /// Latest stored version of `role`
    fn load(&self, role: &str) -> StoreResult<Vec<u8>>;

    /// A specific stored version of `role`
    ///
    /// Timestamp keeps only its current document, so only the current
    /// version can be loaded for it.
    fn load_version(&self, role: &str, version: u64) -> StoreResult<Vec<u8>>;

    /// Latest stored version number of `role`, `None` if never written
    fn current_version(&self, role: &str) -> StoreResult<Option<u64>>;

    /// Durably write `bytes` as `version` of `role`
    ///
    /// Fails with [`StoreError::VersionConflict`] unless the latest stored
    /// version equals `expected_current` (`None` meaning "not yet stored").
    fn persist(
        &self,
        role: &str,
        version: u64,
        expected_current: Option<u64>,
        bytes: &[u8],
    ) -> StoreResult<()>;
}

impl<S: MetadataStore + ?Sized> MetadataStore for std::sync::Arc<S> {
    fn load(&self, role: &str) -> StoreResult<Vec<u8>> {
        (**self).load(role)
    }

    fn load_version(&self, role: &str, version: u64) -> StoreResult<Vec<u8>> {
        (**self).load_version(role, version)
    }

    fn current_version(&self, role: &str) -> StoreResult<Option<u64>> {
        (**self).current_version(role)
    }

    fn persist(
        &self,
        role: &str,
        version: u64,
        expected_current: Option<u64>,
        bytes: &[u8],
    ) -> StoreResult<()> {
        (**self).persist(role, version, expected_current, bytes)
    }
}

/// File name for `version` of `role`
pub fn metadata_filename(role: &str, version: u64) -> String {
    if role == TIMESTAMP {
        format!("{}.json", TIMESTAMP)
    } else {
        format!("{}.{}.json", version, role)
    }
}

/// Split a versioned file name into `(version, role)`
///
/// Returns `None` for `timestamp.json` and anything that is not
/// `<version>.<role>.json`.
pub fn parse_filename(filename: &str) -> Option<(u64, &str)> {
    let stem = filename.strip_suffix(".json")?;
    let (version, role) = stem.split_once('.')?;
    let version = version.parse().ok()?;
    if role.is_empty() {
        return None;
    }
    Some((version, role))
}

/// Reject role names that could escape the store or collide with file naming
pub fn validate_role_name(role: &str) -> StoreResult<()> {
    let valid = !role.is_empty()
        && !role.starts_with('.')
        && role
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid && !role.contains("..") {
        Ok(())
    } else {
        Err(StoreError::InvalidRoleName(role.to_string()))
    }
}

/// Shared optimistic-concurrency check
pub(crate) fn check_expected(
    role: &str,
    version: u64,
    expected: Option<u64>,
    actual: Option<u64>,
) -> StoreResult<()> {
    if expected != actual {
        return Err(StoreError::VersionConflict {
            role: role.to_string(),
            version,
            expected,
            actual,
        });
    }
    if let Some(current) = actual {
        if version <= current {
            return Err(StoreError::VersionConflict {
                role: role.to_string(),
                version,
                expected,
                actual,
            });
        }
    }
    Ok(())
}
