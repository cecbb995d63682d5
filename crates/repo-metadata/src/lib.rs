//! TUF role metadata for the repository worker
//!
//! Defines the signed role documents (root, timestamp, snapshot, targets and
//! the hash-bin delegated targets roles), their canonical signing bytes, and
//! the succinct hash-bin delegation that maps target paths to bins.

pub mod delegation;
pub mod error;
pub mod keys;
pub mod metadata;

pub use delegation::{Delegations, SuccinctRoles};
pub use error::{MetadataError, MetadataResult};
pub use keys::{
    decode_signing_key, encode_signing_key, Ed25519Signer, Key, KeyVal, KEY_SCHEME, KEY_TYPE,
};
pub use metadata::{
    canonical_bytes, meta_name, MetaFile, Metadata, RoleKeys, RolePayload, Root, Signature,
    SignedHeader, Snapshot, TargetFile, Targets, Timestamp, SPEC_VERSION,
};

/// Name of the root role.
pub const ROOT: &str = "root";

/// Name of the timestamp role.
pub const TIMESTAMP: &str = "timestamp";

/// Name of the snapshot role.
pub const SNAPSHOT: &str = "snapshot";

/// Name of the top-level targets role.
pub const TARGETS: &str = "targets";

/// Name of the role that carries the succinct hash-bin delegation.
pub const BIN: &str = "bin";

/// Role class shared by every delegated hash bin.
pub const BINS: &str = "bins";
