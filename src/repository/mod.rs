//! Repository metadata maintenance
//!
//! [`MetadataRepository`] owns every mutation of role documents: the
//! ingest/publish propagation protocol, the scheduled expiry sweeps and
//! bootstrap loading. Each mutation is one bump-sign-persist cycle per
//! touched document; see [`propagation`] and [`maintenance`].

mod bootstrap;
mod bump;
mod consistency;
mod error;
mod locks;
mod maintenance;
mod propagation;
mod report;
mod signing;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use repo_metadata::{Metadata, RolePayload};

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::keys::KeyStore;
use crate::role::RoleClass;
use crate::store::MetadataStore;

pub use bootstrap::InitialMetadata;
pub use bump::{bump_expiry, bump_version, expires_within};
pub use error::{RepositoryError, RepositoryResult};
pub use locks::RoleLocks;
pub use propagation::TargetEntry;
pub use report::{
    BootstrapReport, ConsistencyReport, IngestReport, MaintenanceReport, PublishReport,
    RoleFailure, RoleVersion, Sweep, SweepReport,
};

/// Maintains signed role metadata in a [`MetadataStore`]
pub struct MetadataRepository {
    store: Arc<dyn MetadataStore>,
    keys: Arc<dyn KeyStore>,
    settings: Settings,
    clock: Arc<dyn Clock>,
    role_locks: RoleLocks,
    publish_lock: Mutex<()>,
}

impl MetadataRepository {
    /// Create a repository on the wall clock
    pub fn new<S, K>(store: S, keys: K, settings: Settings) -> Self
    where
        S: MetadataStore + 'static,
        K: KeyStore + 'static,
    {
        Self {
            store: Arc::new(store),
            keys: Arc::new(keys),
            settings,
            clock: Arc::new(SystemClock),
            role_locks: RoleLocks::new(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load and parse the latest version of `role`
    pub fn load<T: RolePayload>(&self, role: &str) -> RepositoryResult<Metadata<T>> {
        let bytes = self
            .store
            .load(role)
            .map_err(|e| RepositoryError::from_store(role, e))?;
        Metadata::from_bytes(&bytes).map_err(|e| RepositoryError::metadata(role, e))
    }

    /// Bump expiry and version, then re-sign
    ///
    /// Does not persist. Call exactly once per document per cycle.
    pub(crate) fn renew<T: RolePayload>(
        &self,
        md: &mut Metadata<T>,
        role: &str,
    ) -> RepositoryResult<()> {
        let class = RoleClass::of(role);
        let days = self.settings.expiration.days(class);
        let interval = self
            .settings
            .expiration
            .interval(class)
            .ok_or_else(|| RepositoryError::expiry_out_of_range(role, days))?;
        bump_expiry(md, self.now(), interval)
            .ok_or_else(|| RepositoryError::expiry_out_of_range(role, days))?;
        bump_version(md);
        self.sign_role(md, role)?;
        Ok(())
    }

    /// Persist `md` as the successor of `expected_current`
    pub(crate) fn persist<T: RolePayload>(
        &self,
        md: &Metadata<T>,
        role: &str,
        expected_current: Option<u64>,
    ) -> RepositoryResult<()> {
        let bytes = md
            .to_bytes()
            .map_err(|e| RepositoryError::metadata(role, e))?;
        self.store
            .persist(role, md.version(), expected_current, &bytes)
            .map_err(|e| RepositoryError::from_store(role, e))?;
        debug!(role, version = md.version(), expires = %md.expires(), "persisted");
        Ok(())
    }

    /// Load, apply `update`, renew and persist `role` under its role lock
    ///
    /// Returns the new version.
    pub(crate) fn update_role<T, F>(&self, role: &str, update: F) -> RepositoryResult<u64>
    where
        T: RolePayload,
        F: FnOnce(&mut Metadata<T>) -> RepositoryResult<()>,
    {
        self.role_locks.with_lock(role, || {
            let mut md = self.load::<T>(role)?;
            let previous = md.version();
            update(&mut md)?;
            self.renew(&mut md, role)?;
            self.persist(&md, role, Some(previous))?;
            Ok(md.version())
        })
    }

    /// Run `f` as the single writer of snapshot and timestamp
    pub(crate) fn with_publish_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = match self.publish_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f()
    }
}

impl std::fmt::Debug for MetadataRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRepository")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
