//! Scheduled expiry sweeps
//!
//! Each sweep renews only documents whose expiry falls within the freshness
//! window, so running a sweep twice without time passing is a no-op the
//! second time.

use chrono::Duration;
use tracing::{debug, error, info, warn};

use repo_metadata::{RolePayload, Snapshot, Targets, Timestamp, SNAPSHOT, TIMESTAMP};

use super::bump::expires_within;
use super::error::{RepositoryError, RepositoryResult};
use super::report::{MaintenanceReport, RoleFailure, RoleVersion, Sweep, SweepReport};
use super::MetadataRepository;

impl MetadataRepository {
    /// Renew every bin near expiry, then publish every bin ahead of snapshot
    ///
    /// Fails without touching anything if the `bin` delegation cannot be
    /// loaded. A failed publish is reported in `failed` under `snapshot`;
    /// the renewed bins stay in `bumped`.
    pub fn bump_bins_roles(&self) -> RepositoryResult<SweepReport> {
        let succinct = match self.succinct_roles() {
            Ok(succinct) => succinct,
            Err(e) => {
                error!(error = %e, "cannot load bin delegation, is the repository initialized?");
                return Err(e);
            }
        };

        let window = self.settings.freshness_window();
        let mut report = SweepReport::new(Sweep::Bins);
        for bin in succinct.role_names() {
            match self.renew_if_expiring::<Targets>(&bin, window) {
                Ok(Some(version)) => {
                    info!(bin = %bin, version, "bin renewed");
                    report.bumped.push(RoleVersion::new(bin, version));
                }
                Ok(None) => {}
                Err(e) => {
                    error!(bin = %bin, error = %e, "bin renewal failed");
                    report.failed.push(RoleFailure::new(bin, &e));
                }
            }
        }

        if report.bumped.is_empty() {
            debug!("no bins near expiry");
        }

        // Every readable bin is a candidate, so bins renewed by an earlier
        // sweep whose publish failed are recorded now. Publish skips the
        // ones snapshot already has.
        let candidates: Vec<String> = succinct
            .role_names()
            .filter(|bin| !report.failed.iter().any(|f| &f.role == bin))
            .collect();
        match self.publish_targets_metas(&candidates) {
            Ok(publish) if publish.is_noop() => {}
            Ok(publish) => {
                let renewed = report.bumped.len();
                if publish.recorded.len() > renewed {
                    warn!(
                        recorded = publish.recorded.len(),
                        renewed, "published bins left behind by an earlier cycle"
                    );
                }
                report.publish = Some(publish);
            }
            Err(e) => {
                error!(
                    error = %e,
                    bumped = report.bumped.len(),
                    "publishing renewed bins failed, next sweep retries"
                );
                report.failed.push(RoleFailure::new(SNAPSHOT, &e));
            }
        }
        Ok(report)
    }

    /// Renew snapshot if near expiry, cascading to timestamp
    ///
    /// Snapshot entries are left as they are.
    pub fn bump_snapshot(&self) -> RepositoryResult<SweepReport> {
        self.with_publish_lock(|| {
            let snapshot = self.load::<Snapshot>(SNAPSHOT)?;
            let mut report = SweepReport::new(Sweep::Snapshot);
            if !expires_within(&snapshot, self.now(), self.settings.freshness_window()) {
                debug!(expires = %snapshot.expires(), "snapshot not near expiry");
                return Ok(report);
            }
            report.publish = Some(self.propagate(snapshot, Vec::new())?);
            Ok(report)
        })
    }

    /// Renew timestamp if near expiry
    ///
    /// Also re-points a timestamp left behind by an interrupted publish at
    /// the latest snapshot.
    pub fn bump_timestamp(&self) -> RepositoryResult<SweepReport> {
        self.with_publish_lock(|| {
            let mut timestamp = self.load::<Timestamp>(TIMESTAMP)?;
            let snapshot_version = self
                .store
                .current_version(SNAPSHOT)
                .map_err(|e| RepositoryError::from_store(SNAPSHOT, e))?
                .ok_or_else(|| RepositoryError::NotFound {
                    role: SNAPSHOT.to_string(),
                })?;

            let mut report = SweepReport::new(Sweep::Timestamp);
            let pointer = timestamp.signed.snapshot_meta().map(|m| m.version);
            let stale = pointer != Some(snapshot_version);
            let expiring =
                expires_within(&timestamp, self.now(), self.settings.freshness_window());
            if !stale && !expiring {
                debug!(expires = %timestamp.expires(), "timestamp not near expiry");
                return Ok(report);
            }
            if stale {
                warn!(?pointer, snapshot_version, "timestamp behind snapshot, re-pointing");
                timestamp.signed.set_snapshot_version(snapshot_version);
            }

            let previous = timestamp.version();
            self.renew(&mut timestamp, TIMESTAMP)?;
            self.persist(&timestamp, TIMESTAMP, Some(previous))?;
            info!(version = timestamp.version(), snapshot_version, "timestamp renewed");
            report
                .bumped
                .push(RoleVersion::new(TIMESTAMP, timestamp.version()));
            Ok(report)
        })
    }

    /// One full maintenance pass: bins, then snapshot, then timestamp
    ///
    /// A failing sweep does not prevent the later ones.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let bins = self.bump_bins_roles();
        let snapshot = self.bump_snapshot();
        if let Err(e) = &snapshot {
            error!(error = %e, "snapshot sweep failed");
        }
        let timestamp = self.bump_timestamp();
        if let Err(e) = &timestamp {
            error!(error = %e, "timestamp sweep failed");
        }
        MaintenanceReport {
            bins,
            snapshot,
            timestamp,
        }
    }

    /// Renew `role` under its role lock if it expires within `window`
    fn renew_if_expiring<T: RolePayload>(
        &self,
        role: &str,
        window: Duration,
    ) -> RepositoryResult<Option<u64>> {
        self.role_locks.with_lock(role, || {
            let mut md = self.load::<T>(role)?;
            if !expires_within(&md, self.now(), window) {
                return Ok(None);
            }
            let previous = md.version();
            self.renew(&mut md, role)?;
            self.persist(&md, role, Some(previous))?;
            Ok(Some(md.version()))
        })
    }
}
