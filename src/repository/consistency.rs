//! Cross-role invariant checks over persisted state

use tracing::{debug, warn};

use repo_metadata::{Snapshot, Timestamp, SNAPSHOT, TIMESTAMP};

use super::error::{RepositoryError, RepositoryResult};
use super::report::ConsistencyReport;
use super::MetadataRepository;
use crate::store::StoreError;

impl MetadataRepository {
    /// Verify that timestamp points at the latest snapshot, that every
    /// snapshot entry is stored at the recorded version, and that neither
    /// snapshot nor timestamp has expired
    pub fn check_consistency(&self) -> RepositoryResult<ConsistencyReport> {
        let snapshot = self.load::<Snapshot>(SNAPSHOT)?;
        let timestamp = self.load::<Timestamp>(TIMESTAMP)?;
        let mut report = ConsistencyReport {
            snapshot_version: Some(snapshot.version()),
            timestamp_version: Some(timestamp.version()),
            violations: Vec::new(),
        };

        match timestamp.signed.snapshot_meta().map(|m| m.version) {
            Some(version) if version == snapshot.version() => {}
            Some(version) => report.violations.push(format!(
                "timestamp points at snapshot v{}, latest snapshot is v{}",
                version,
                snapshot.version()
            )),
            None => report
                .violations
                .push("timestamp has no snapshot entry".to_string()),
        }

        for (role, version) in snapshot.signed.entries() {
            match self.store.load_version(role, version) {
                Ok(_) => debug!(role, version, "snapshot entry present"),
                Err(StoreError::NotFound { .. } | StoreError::VersionNotFound { .. }) => {
                    report.violations.push(format!(
                        "snapshot records {role} v{version}, which is not stored"
                    ));
                }
                Err(e) => return Err(RepositoryError::Store(e)),
            }
        }

        let now = self.now();
        if snapshot.expires() <= now {
            report
                .violations
                .push(format!("snapshot expired at {}", snapshot.expires().to_rfc3339()));
        }
        if timestamp.expires() <= now {
            report
                .violations
                .push(format!("timestamp expired at {}", timestamp.expires().to_rfc3339()));
        }

        for violation in &report.violations {
            warn!(violation = %violation, "consistency check");
        }
        Ok(report)
    }
}
