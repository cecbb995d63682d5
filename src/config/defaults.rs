//! Settings and their built-in defaults (layer 1)

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::role::RoleClass;

/// Config file read from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "repo-worker.toml";

/// Expiration interval per role class, in days
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationSettings {
    pub root: i64,
    pub timestamp: i64,
    pub snapshot: i64,
    pub targets: i64,
    pub bins: i64,
}

impl ExpirationSettings {
    /// Configured interval for a role class in days
    pub fn days(&self, class: RoleClass) -> i64 {
        match class {
            RoleClass::Root => self.root,
            RoleClass::Timestamp => self.timestamp,
            RoleClass::Snapshot => self.snapshot,
            RoleClass::Targets => self.targets,
            RoleClass::Bins => self.bins,
        }
    }

    /// `None` when the day count does not fit a duration
    pub fn interval(&self, class: RoleClass) -> Option<Duration> {
        Duration::try_days(self.days(class))
    }
}

impl Default for ExpirationSettings {
    fn default() -> Self {
        Self {
            root: 365,
            timestamp: 1,
            snapshot: 1,
            targets: 365,
            bins: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding the role metadata files
    pub metadata_dir: PathBuf,

    /// Maximum wait for a per-role file lock
    pub lock_timeout_seconds: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from("metadata"),
            lock_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySettings {
    /// Directory with one sub-directory of `.key` files per key role
    pub keys_dir: PathBuf,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            keys_dir: PathBuf::from("keys"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Seconds between maintenance passes in `run` mode
    pub interval_seconds: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
        }
    }
}

/// Complete worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Freshness window: roles expiring within this many hours are renewed
    pub hours_before_expire: i64,

    /// Refuse to persist a document that does not meet its role threshold
    pub enforce_threshold: bool,

    pub expiration: ExpirationSettings,

    pub storage: StorageSettings,

    pub keys: KeySettings,

    pub schedule: ScheduleSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hours_before_expire: 1,
            enforce_threshold: false,
            expiration: ExpirationSettings::default(),
            storage: StorageSettings::default(),
            keys: KeySettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Settings {
    /// Saturates for hour counts that do not fit a duration
    pub fn freshness_window(&self) -> Duration {
        Duration::try_hours(self.hours_before_expire).unwrap_or(Duration::MAX)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.storage.lock_timeout_seconds)
    }

    pub fn schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.schedule.interval_seconds)
    }

    /// Defaults as a TOML table for merging
    pub fn defaults_table() -> toml::Table {
        // Settings only holds strings, integers, booleans and tables
        match toml::Value::try_from(Settings::default()) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        }
    }
}
