//! Ingest and publish
//!
//! A cycle moves through `Idle -> BinsDirty -> SnapshotDirty ->
//! TimestampDirty -> Idle`. Ingest re-signs only the bins that received
//! targets; publish re-signs snapshot only if a recorded bin version moved,
//! and timestamp only if snapshot was re-signed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use repo_metadata::{
    Metadata, Snapshot, SuccinctRoles, TargetFile, Targets, Timestamp, BIN, SNAPSHOT, TIMESTAMP,
};

use super::error::{RepositoryError, RepositoryResult};
use super::report::{IngestReport, PublishReport, RoleFailure, RoleVersion};
use super::MetadataRepository;
use crate::role::RoleClass;

/// An artifact to add: its path and descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub path: String,
    pub info: TargetFile,
}

impl TargetEntry {
    pub fn new(path: impl Into<String>, info: TargetFile) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }
}

impl MetadataRepository {
    /// The succinct delegation declared by `bin`
    pub fn succinct_roles(&self) -> RepositoryResult<SuccinctRoles> {
        let bin = self.load::<Targets>(BIN)?;
        bin.signed
            .delegations
            .and_then(|d| d.succinct_roles)
            .ok_or_else(|| RepositoryError::MissingDelegation {
                role: BIN.to_string(),
            })
    }

    /// Upsert targets into their bins
    ///
    /// Each affected bin gets exactly one bump-sign-persist cycle. A failing
    /// bin is reported and does not stop its siblings. Snapshot and timestamp
    /// are not touched; pass [`IngestReport::changed_roles`] to
    /// [`publish_targets_metas`](Self::publish_targets_metas).
    pub fn add_targets(&self, targets: Vec<TargetEntry>) -> RepositoryResult<IngestReport> {
        if targets.is_empty() {
            debug!("no targets to add");
            return Ok(IngestReport::default());
        }
        for target in &targets {
            target
                .info
                .validate(&target.path)
                .map_err(RepositoryError::InvalidTarget)?;
        }

        let succinct = self.succinct_roles()?;
        let mut by_bin: BTreeMap<String, Vec<TargetEntry>> = BTreeMap::new();
        for target in targets {
            by_bin
                .entry(succinct.role_for_target(&target.path))
                .or_default()
                .push(target);
        }

        let mut report = IngestReport::default();
        for (bin, entries) in by_bin {
            let count = entries.len();
            let result = self.update_role::<Targets, _>(&bin, |md| {
                for entry in entries {
                    md.signed.upsert(entry.path, entry.info);
                }
                Ok(())
            });
            match result {
                Ok(version) => {
                    info!(bin = %bin, version, targets = count, "bin updated");
                    report.updated.push(RoleVersion::new(bin, version));
                }
                Err(e) => {
                    error!(bin = %bin, error = %e, "bin update failed");
                    report.failed.push(RoleFailure::new(bin, &e));
                }
            }
        }
        Ok(report)
    }

    /// Record the current versions of `roles` in snapshot, then timestamp
    ///
    /// Roles whose stored version matches the snapshot entry are skipped. If
    /// none advanced, neither snapshot nor timestamp is touched.
    pub fn publish_targets_metas(&self, roles: &[String]) -> RepositoryResult<PublishReport> {
        for role in roles {
            if !matches!(RoleClass::of(role), RoleClass::Targets | RoleClass::Bins) {
                return Err(RepositoryError::InvalidRole { role: role.clone() });
            }
        }

        self.with_publish_lock(|| {
            let snapshot = self.load::<Snapshot>(SNAPSHOT)?;
            let mut seen = BTreeSet::new();
            let mut changed = Vec::new();

            for role in roles {
                if !seen.insert(role.as_str()) {
                    continue;
                }
                let current = self
                    .store
                    .current_version(role)
                    .map_err(|e| RepositoryError::from_store(role, e))?
                    .ok_or_else(|| RepositoryError::NotFound { role: role.clone() })?;

                match snapshot.signed.version_of(role) {
                    Some(recorded) if recorded >= current => {
                        debug!(role = %role, version = current, "already recorded in snapshot");
                    }
                    recorded => {
                        debug!(role = %role, ?recorded, version = current, "version advanced");
                        changed.push(RoleVersion::new(role.clone(), current));
                    }
                }
            }

            if changed.is_empty() {
                info!("no targets role advanced, snapshot and timestamp left untouched");
                return Ok(PublishReport::default());
            }
            self.propagate(snapshot, changed)
        })
    }

    /// Snapshot and timestamp transitions
    ///
    /// The caller holds the publish lock and passes the snapshot it loaded
    /// under it. Both documents are renewed and signed before either is
    /// written, so a signing failure leaves the store untouched.
    pub(crate) fn propagate(
        &self,
        mut snapshot: Metadata<Snapshot>,
        changed: Vec<RoleVersion>,
    ) -> RepositoryResult<PublishReport> {
        let mut timestamp = self.load::<Timestamp>(TIMESTAMP)?;
        let snapshot_base = snapshot.version();
        let timestamp_base = timestamp.version();

        for entry in &changed {
            snapshot.signed.set_version(&entry.role, entry.version);
        }
        self.renew(&mut snapshot, SNAPSHOT)?;

        timestamp.signed.set_snapshot_version(snapshot.version());
        self.renew(&mut timestamp, TIMESTAMP)?;

        self.persist(&snapshot, SNAPSHOT, Some(snapshot_base))?;
        info!(
            version = snapshot.version(),
            entries = changed.len(),
            "snapshot updated"
        );

        if let Err(e) = self.persist(&timestamp, TIMESTAMP, Some(timestamp_base)) {
            error!(
                snapshot_version = snapshot.version(),
                error = %e,
                "timestamp update failed after snapshot was persisted"
            );
            return Err(RepositoryError::PartialPublish {
                snapshot_version: snapshot.version(),
                source: Box::new(e),
            });
        }
        info!(
            version = timestamp.version(),
            snapshot_version = snapshot.version(),
            expires = %timestamp.expires(),
            "timestamp updated"
        );

        Ok(PublishReport {
            recorded: changed,
            snapshot: Some(snapshot.version()),
            timestamp: Some(timestamp.version()),
            timestamp_expires: Some(timestamp.expires()),
        })
    }
}
