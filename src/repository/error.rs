//! Repository error taxonomy

use thiserror::Error;

use repo_metadata::MetadataError;

use crate::keys::KeyError;
use crate::store::StoreError;

/// Errors that abort a maintenance cycle
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A role document expected to exist is absent
    #[error("{role} not found")]
    NotFound { role: String },

    /// No signing keys resolvable for a role while thresholds are enforced
    #[error("no signing keys available for {role} (key role {key_role})")]
    SigningUnavailable { role: String, key_role: String },

    #[error("{role} has {valid} valid signature(s), threshold is {threshold}")]
    ThresholdNotMet {
        role: String,
        valid: usize,
        threshold: u32,
    },

    #[error("no signing authority declared for {role}")]
    UnknownAuthority { role: String },

    /// The store rejected a read or write, including version conflicts
    #[error("store failure: {0}")]
    Store(#[source] StoreError),

    #[error("key store failure: {0}")]
    Keys(#[from] KeyError),

    #[error("invalid metadata for {role}: {source}")]
    Metadata {
        role: String,
        #[source]
        source: MetadataError,
    },

    #[error("{role} does not declare a succinct hash-bin delegation")]
    MissingDelegation { role: String },

    #[error("{role} cannot be published as a targets role")]
    InvalidRole { role: String },

    #[error("invalid bootstrap metadata: {0}")]
    InvalidBootstrap(String),

    #[error("invalid target: {0}")]
    InvalidTarget(#[source] MetadataError),

    /// The configured interval does not yield a representable expiry
    #[error("expiry for {role} out of range ({days} days from now)")]
    ExpiryOutOfRange { role: String, days: i64 },

    /// Snapshot was persisted but timestamp was not; the timestamp sweep
    /// re-points timestamp at the persisted snapshot
    #[error("snapshot version {snapshot_version} persisted but timestamp update failed: {source}")]
    PartialPublish {
        snapshot_version: u64,
        #[source]
        source: Box<RepositoryError>,
    },
}

impl RepositoryError {
    /// Map a store error for `role`, lifting a missing document to `NotFound`
    pub fn from_store(role: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => RepositoryError::NotFound {
                role: role.to_string(),
            },
            other => RepositoryError::Store(other),
        }
    }

    pub fn expiry_out_of_range(role: &str, days: i64) -> Self {
        RepositoryError::ExpiryOutOfRange {
            role: role.to_string(),
            days,
        }
    }

    pub fn metadata(role: &str, source: MetadataError) -> Self {
        RepositoryError::Metadata {
            role: role.to_string(),
            source,
        }
    }

    /// Whether the error is a lost-update rejection from the store
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::Store(StoreError::VersionConflict { .. })
        )
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
