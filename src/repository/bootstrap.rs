//! Initial role documents
//!
//! [`InitialMetadata::generate`] builds a freshly signed version-1 document
//! set from a key store. [`MetadataRepository::bootstrap`] validates a
//! document set and writes it into an empty store.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use tracing::info;

use repo_metadata::{
    Delegations, Key, Metadata, RoleKeys, RolePayload, Root, Snapshot, SuccinctRoles, Targets,
    Timestamp, BIN, BINS, ROOT, SNAPSHOT, TARGETS, TIMESTAMP,
};

use super::error::{RepositoryError, RepositoryResult};
use super::report::{BootstrapReport, RoleVersion};
use super::MetadataRepository;
use crate::config::Settings;
use crate::keys::KeyStore;
use crate::role::RoleClass;
use crate::store::validate_role_name;

/// A complete, signed version-1 document set keyed by role name
#[derive(Debug, Clone, Default)]
pub struct InitialMetadata {
    documents: BTreeMap<String, Value>,
}

impl InitialMetadata {
    /// Build root, targets, bin, every bin, snapshot and timestamp
    ///
    /// Keys come from `keys`; roles without keys are written unsigned.
    pub fn generate(
        keys: &dyn KeyStore,
        settings: &Settings,
        now: DateTime<Utc>,
        bit_length: u32,
        name_prefix: &str,
    ) -> RepositoryResult<Self> {
        let now = now.trunc_subsecs(0);
        let expires = |role: &str| {
            let class = RoleClass::of(role);
            settings
                .expiration
                .interval(class)
                .and_then(|interval| now.checked_add_signed(interval))
                .ok_or_else(|| {
                    RepositoryError::expiry_out_of_range(role, settings.expiration.days(class))
                })
        };
        let mut initial = Self::default();

        let mut root = Root::new(expires(ROOT)?);
        for role in [ROOT, TIMESTAMP, SNAPSHOT, TARGETS, BIN] {
            for signer in keys.keys_for(RoleClass::key_role(role))? {
                root.add_key(role, signer.public_key().clone())
                    .map_err(|e| RepositoryError::metadata(ROOT, e))?;
            }
            root.roles.entry(role.to_string()).or_insert_with(|| RoleKeys {
                keyids: Vec::new(),
                threshold: 1,
            });
        }
        initial.insert(keys, ROOT, Metadata::new(root))?;

        let targets = Targets::new(expires(TARGETS)?);
        initial.insert(keys, TARGETS, Metadata::new(targets))?;

        let mut delegation_keys: BTreeMap<String, Key> = BTreeMap::new();
        for signer in keys.keys_for(BINS)? {
            delegation_keys.insert(signer.key_id().to_string(), signer.public_key().clone());
        }
        let succinct = SuccinctRoles::new(
            delegation_keys.keys().cloned().collect(),
            1,
            bit_length,
            name_prefix,
        )
        .map_err(|e| RepositoryError::metadata(BIN, e))?;
        let bin_names: Vec<String> = succinct.role_names().collect();

        let mut bin = Targets::new(expires(BIN)?);
        bin.delegations = Some(Delegations {
            keys: delegation_keys,
            succinct_roles: Some(succinct),
        });
        initial.insert(keys, BIN, Metadata::new(bin))?;

        let mut snapshot = Snapshot::new(expires(SNAPSHOT)?);
        snapshot.set_version(TARGETS, 1);
        snapshot.set_version(BIN, 1);
        for name in &bin_names {
            initial.insert(keys, name, Metadata::new(Targets::new(expires(name.as_str())?)))?;
            snapshot.set_version(name, 1);
        }
        initial.insert(keys, SNAPSHOT, Metadata::new(snapshot))?;

        let timestamp = Timestamp::new(expires(TIMESTAMP)?, 1);
        initial.insert(keys, TIMESTAMP, Metadata::new(timestamp))?;

        Ok(initial)
    }

    fn insert<T: RolePayload>(
        &mut self,
        keys: &dyn KeyStore,
        role: &str,
        mut md: Metadata<T>,
    ) -> RepositoryResult<()> {
        for signer in keys.keys_for(RoleClass::key_role(role))? {
            md.sign(&signer, true)
                .map_err(|e| RepositoryError::metadata(role, e))?;
        }
        let value = serde_json::to_value(&md)
            .map_err(|e| RepositoryError::metadata(role, e.into()))?;
        self.documents.insert(role.to_string(), value);
        Ok(())
    }

    pub fn documents(&self) -> &BTreeMap<String, Value> {
        &self.documents
    }

    pub fn into_documents(self) -> BTreeMap<String, Value> {
        self.documents
    }
}

/// A validated document ready to be written
struct Prepared {
    role: String,
    version: u64,
    bytes: Vec<u8>,
}

fn parse_document<T: RolePayload>(role: &str, value: &Value) -> RepositoryResult<Metadata<T>> {
    let bytes = serde_json::to_vec(value).map_err(|e| RepositoryError::metadata(role, e.into()))?;
    let md = Metadata::<T>::from_bytes(&bytes).map_err(|e| RepositoryError::metadata(role, e))?;
    if md.version() == 0 {
        return Err(RepositoryError::InvalidBootstrap(format!(
            "{role} has version 0, versions start at 1"
        )));
    }
    Ok(md)
}

fn prepare<T: RolePayload>(role: &str, md: &Metadata<T>) -> RepositoryResult<Prepared> {
    Ok(Prepared {
        role: role.to_string(),
        version: md.version(),
        bytes: md.to_bytes().map_err(|e| RepositoryError::metadata(role, e))?,
    })
}

/// Write order: root first, timestamp last
fn write_rank(role: &str) -> u8 {
    match RoleClass::of(role) {
        RoleClass::Root => 0,
        RoleClass::Targets | RoleClass::Bins => 1,
        RoleClass::Snapshot => 2,
        RoleClass::Timestamp => 3,
    }
}

impl MetadataRepository {
    /// Load an initial document set into an empty store
    ///
    /// The whole set is validated before anything is written: every document
    /// must parse as its role's type, `bin` must declare a valid succinct
    /// delegation, snapshot entries must reference documents in the set,
    /// and timestamp must point at snapshot.
    pub fn bootstrap(
        &self,
        documents: BTreeMap<String, Value>,
    ) -> RepositoryResult<BootstrapReport> {
        for required in [ROOT, TIMESTAMP, SNAPSHOT, BIN] {
            if !documents.contains_key(required) {
                return Err(RepositoryError::InvalidBootstrap(format!(
                    "missing required role {required}"
                )));
            }
        }

        let mut prepared = Vec::with_capacity(documents.len());
        let mut versions: BTreeMap<&str, u64> = BTreeMap::new();
        let mut snapshot_version = 0;
        let mut snapshot_entries: Vec<(String, u64)> = Vec::new();
        let mut timestamp_pointer = None;

        for (role, value) in &documents {
            validate_role_name(role)
                .map_err(|e| RepositoryError::InvalidBootstrap(e.to_string()))?;

            let doc = match RoleClass::of(role) {
                RoleClass::Root => prepare(role, &parse_document::<Root>(role, value)?)?,
                RoleClass::Timestamp => {
                    let md = parse_document::<Timestamp>(role, value)?;
                    timestamp_pointer = md.signed.snapshot_meta().map(|m| m.version);
                    prepare(role, &md)?
                }
                RoleClass::Snapshot => {
                    let md = parse_document::<Snapshot>(role, value)?;
                    snapshot_version = md.version();
                    snapshot_entries = md
                        .signed
                        .entries()
                        .map(|(name, version)| (name.to_string(), version))
                        .collect();
                    prepare(role, &md)?
                }
                RoleClass::Targets | RoleClass::Bins => {
                    let md = parse_document::<Targets>(role, value)?;
                    if role == BIN {
                        let succinct = md
                            .signed
                            .delegations
                            .as_ref()
                            .and_then(|d| d.succinct_roles.as_ref())
                            .ok_or_else(|| RepositoryError::MissingDelegation {
                                role: BIN.to_string(),
                            })?;
                        succinct
                            .validate()
                            .map_err(|e| RepositoryError::metadata(BIN, e))?;
                    }
                    prepare(role, &md)?
                }
            };
            versions.insert(role.as_str(), doc.version);
            prepared.push(doc);
        }

        if timestamp_pointer != Some(snapshot_version) {
            return Err(RepositoryError::InvalidBootstrap(format!(
                "timestamp points at snapshot {:?}, snapshot is version {}",
                timestamp_pointer, snapshot_version
            )));
        }
        for (name, version) in &snapshot_entries {
            if versions.get(name.as_str()) != Some(version) {
                return Err(RepositoryError::InvalidBootstrap(format!(
                    "snapshot records {name} v{version}, which is not in the document set"
                )));
            }
        }

        prepared.sort_by_key(|doc| write_rank(&doc.role));

        self.with_publish_lock(|| {
            for doc in &prepared {
                let existing = self
                    .store
                    .current_version(&doc.role)
                    .map_err(|e| RepositoryError::from_store(&doc.role, e))?;
                if existing.is_some() {
                    return Err(RepositoryError::InvalidBootstrap(format!(
                        "repository already initialized: {} exists",
                        doc.role
                    )));
                }
            }

            let mut report = BootstrapReport::default();
            for doc in &prepared {
                self.store
                    .persist(&doc.role, doc.version, None, &doc.bytes)
                    .map_err(|e| RepositoryError::from_store(&doc.role, e))?;
                report.written.push(RoleVersion::new(doc.role.clone(), doc.version));
            }
            info!(roles = report.written.len(), "bootstrap complete");
            Ok(report)
        })
    }
}
