//! Operation reports
//!
//! Every entry point returns one of these on success. `Display` renders the
//! human-readable summary printed by the CLI.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::RepositoryError;

/// A role and the version it was moved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleVersion {
    pub role: String,
    pub version: u64,
}

impl RoleVersion {
    pub fn new(role: impl Into<String>, version: u64) -> Self {
        Self {
            role: role.into(),
            version,
        }
    }
}

impl fmt::Display for RoleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.role, self.version)
    }
}

/// A role whose cycle failed, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleFailure {
    pub role: String,
    pub error: String,
}

impl RoleFailure {
    pub fn new(role: impl Into<String>, error: &RepositoryError) -> Self {
        Self {
            role: role.into(),
            error: error.to_string(),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of loading initial metadata
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub written: Vec<RoleVersion>,
}

impl fmt::Display for BootstrapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bootstrap: wrote {} role(s)", self.written.len())?;
        if !self.written.is_empty() {
            write!(f, ": {}", join(&self.written))?;
        }
        Ok(())
    }
}

/// Result of ingesting a batch of targets into their bins
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Bins that were updated, with their new versions
    pub updated: Vec<RoleVersion>,

    /// Bins whose update failed; their siblings were still processed
    pub failed: Vec<RoleFailure>,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Names of the bins that changed
    pub fn changed_roles(&self) -> Vec<String> {
        self.updated.iter().map(|rv| rv.role.clone()).collect()
    }

    /// The bins left ahead of snapshot when the publish after this ingest
    /// failed, `None` if nothing was updated
    pub fn unpublished(&self) -> Option<String> {
        if self.updated.is_empty() {
            return None;
        }
        Some(format!("updated but not published: {}", join(&self.updated)))
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.updated.is_empty() && self.failed.is_empty() {
            return write!(f, "add targets: nothing to do");
        }
        write!(f, "add targets: updated {} bin(s)", self.updated.len())?;
        if !self.updated.is_empty() {
            write!(f, " ({})", join(&self.updated))?;
        }
        for failure in &self.failed {
            write!(f, "; {} failed: {}", failure.role, failure.error)?;
        }
        Ok(())
    }
}

/// Result of folding changed targets roles into snapshot and timestamp
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    /// Entries whose recorded snapshot version changed
    pub recorded: Vec<RoleVersion>,

    /// New snapshot version, if snapshot was re-signed
    pub snapshot: Option<u64>,

    /// New timestamp version, if timestamp was re-signed
    pub timestamp: Option<u64>,

    /// Timestamp expiry after this cycle, if it was re-signed
    pub timestamp_expires: Option<DateTime<Utc>>,
}

impl PublishReport {
    /// Neither snapshot nor timestamp was touched
    pub fn is_noop(&self) -> bool {
        self.snapshot.is_none() && self.timestamp.is_none()
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return write!(f, "publish: snapshot already up to date");
        }
        write!(f, "publish:")?;
        if !self.recorded.is_empty() {
            write!(f, " recorded {};", join(&self.recorded))?;
        }
        if let Some(version) = self.snapshot {
            write!(f, " snapshot v{};", version)?;
        }
        match (self.timestamp, self.timestamp_expires) {
            (Some(version), Some(expires)) => {
                write!(f, " timestamp v{} expires {}", version, expires.to_rfc3339())
            }
            (Some(version), None) => write!(f, " timestamp v{}", version),
            _ => Ok(()),
        }
    }
}

/// Which scheduled sweep produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sweep {
    Bins,
    Snapshot,
    Timestamp,
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sweep::Bins => f.write_str("bins"),
            Sweep::Snapshot => f.write_str("snapshot"),
            Sweep::Timestamp => f.write_str("timestamp"),
        }
    }
}

/// Result of a scheduled expiry sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep: Sweep,

    /// Roles renewed by the sweep itself
    pub bumped: Vec<RoleVersion>,

    /// Roles whose renewal failed
    pub failed: Vec<RoleFailure>,

    /// Propagation into snapshot/timestamp, if anything was renewed
    pub publish: Option<PublishReport>,
}

impl SweepReport {
    pub fn new(sweep: Sweep) -> Self {
        Self {
            sweep,
            bumped: Vec::new(),
            failed: Vec::new(),
            publish: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing was within the freshness window
    pub fn is_noop(&self) -> bool {
        self.bumped.is_empty() && self.publish.as_ref().map_or(true, |p| p.is_noop())
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() && self.failed.is_empty() {
            return write!(f, "scheduled {} bump: nothing near expiry", self.sweep);
        }
        let mut parts = Vec::new();
        if !self.bumped.is_empty() {
            parts.push(format!("bumped {}", join(&self.bumped)));
        }
        for failure in &self.failed {
            parts.push(format!("{} failed: {}", failure.role, failure.error));
        }
        if let Some(publish) = &self.publish {
            parts.push(publish.to_string());
        }
        write!(f, "scheduled {} bump: {}", self.sweep, parts.join("; "))
    }
}

/// Violations of the cross-role invariants over persisted state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    pub snapshot_version: Option<u64>,
    pub timestamp_version: Option<u64>,
    pub violations: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_consistent() {
            return write!(
                f,
                "consistent: timestamp v{} -> snapshot v{}",
                self.timestamp_version.unwrap_or(0),
                self.snapshot_version.unwrap_or(0)
            );
        }
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

/// Outcome of one full maintenance pass (bins, snapshot, timestamp)
#[derive(Debug)]
pub struct MaintenanceReport {
    pub bins: Result<SweepReport, RepositoryError>,
    pub snapshot: Result<SweepReport, RepositoryError>,
    pub timestamp: Result<SweepReport, RepositoryError>,
}

impl MaintenanceReport {
    pub fn is_success(&self) -> bool {
        [&self.bins, &self.snapshot, &self.timestamp]
            .iter()
            .all(|r| matches!(r, Ok(report) if report.is_success()))
    }
}

impl fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sweeps = [
            (Sweep::Bins, &self.bins),
            (Sweep::Snapshot, &self.snapshot),
            (Sweep::Timestamp, &self.timestamp),
        ];
        for (i, (sweep, result)) in sweeps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match result {
                Ok(report) => write!(f, "{}", report)?,
                Err(e) => write!(f, "scheduled {} bump failed: {}", sweep, e)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_summary() {
        let report = IngestReport {
            updated: vec![RoleVersion::new("bins-2", 2)],
            failed: vec![RoleFailure {
                role: "bins-1".to_string(),
                error: "bins-1 not found".to_string(),
            }],
        };
        let text = report.to_string();
        assert!(text.contains("bins-2 v2"));
        assert!(text.contains("bins-1 failed"));
        assert!(!report.is_success());
        assert_eq!(report.changed_roles(), vec!["bins-2".to_string()]);
    }

    #[test]
    fn test_unpublished_names_updated_bins() {
        let report = IngestReport {
            updated: vec![RoleVersion::new("bins-0", 3), RoleVersion::new("bins-2", 2)],
            failed: Vec::new(),
        };
        assert_eq!(
            report.unpublished().as_deref(),
            Some("updated but not published: bins-0 v3, bins-2 v2")
        );
        assert_eq!(IngestReport::default().unpublished(), None);
    }

    #[test]
    fn test_publish_noop_summary() {
        let report = PublishReport::default();
        assert!(report.is_noop());
        assert_eq!(report.to_string(), "publish: snapshot already up to date");
    }

    #[test]
    fn test_sweep_noop() {
        let report = SweepReport::new(Sweep::Bins);
        assert!(report.is_noop());
        assert!(report.is_success());
        assert!(report.to_string().contains("nothing near expiry"));
    }

    #[test]
    fn test_maintenance_success_requires_all_sweeps() {
        let ok = MaintenanceReport {
            bins: Ok(SweepReport::new(Sweep::Bins)),
            snapshot: Ok(SweepReport::new(Sweep::Snapshot)),
            timestamp: Ok(SweepReport::new(Sweep::Timestamp)),
        };
        assert!(ok.is_success());

        let failed = MaintenanceReport {
            bins: Err(RepositoryError::NotFound {
                role: "bin".to_string(),
            }),
            snapshot: Ok(SweepReport::new(Sweep::Snapshot)),
            timestamp: Ok(SweepReport::new(Sweep::Timestamp)),
        };
        assert!(!failed.is_success());
        assert!(failed.to_string().contains("scheduled bins bump failed: bin not found"));
    }
}
