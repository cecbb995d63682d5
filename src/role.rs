//! Role classes
//!
//! Expiration intervals and signing keys are resolved per role class, not
//! per role: every hash bin shares the `bins` class.

use std::fmt;

use serde::{Deserialize, Serialize};

use repo_metadata::{BIN, BINS, ROOT, SNAPSHOT, TARGETS, TIMESTAMP};

/// Class of a role for expiry and key lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleClass {
    Root,
    Timestamp,
    Snapshot,
    /// Top-level targets and the delegating `bin` role
    Targets,
    /// Every delegated hash bin
    Bins,
}

impl RoleClass {
    pub const ALL: [RoleClass; 5] = [
        RoleClass::Root,
        RoleClass::Timestamp,
        RoleClass::Snapshot,
        RoleClass::Targets,
        RoleClass::Bins,
    ];

    /// Classify a role by name; anything not top-level is a bin
    pub fn of(role_name: &str) -> Self {
        match role_name {
            ROOT => RoleClass::Root,
            TIMESTAMP => RoleClass::Timestamp,
            SNAPSHOT => RoleClass::Snapshot,
            TARGETS | BIN => RoleClass::Targets,
            _ => RoleClass::Bins,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Root => ROOT,
            RoleClass::Timestamp => TIMESTAMP,
            RoleClass::Snapshot => SNAPSHOT,
            RoleClass::Targets => TARGETS,
            RoleClass::Bins => BINS,
        }
    }

    /// Name under which the key store holds this role's keys
    ///
    /// Top-level roles sign with their own keys; all bins share `bins`.
    pub fn key_role(role_name: &str) -> &str {
        match Self::of(role_name) {
            RoleClass::Bins => BINS,
            _ => role_name,
        }
    }
}

impl fmt::Display for RoleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
