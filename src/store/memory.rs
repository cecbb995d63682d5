//! In-memory metadata store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use repo_metadata::TIMESTAMP;

use super::{
    check_expected, metadata_filename, validate_role_name, MetadataStore, StoreError, StoreResult,
};

/// Metadata store backed by a map of file name to bytes
///
/// Applies the same naming and version rules as [`super::FileStore`], so it
/// can stand in for it in tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// File name -> serialized document
    files: BTreeMap<String, Vec<u8>>,
    /// Role -> latest stored version
    latest: HashMap<String, u64>,
    /// Number of successful writes per role
    writes: HashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored file names, sorted
    pub fn filenames(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|inner| inner.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_file(&self, filename: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.files.contains_key(filename))
            .unwrap_or(false)
    }

    /// How many times `role` has been written
    pub fn write_count(&self, role: &str) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.writes.get(role).copied())
            .unwrap_or(0)
    }

    /// Total writes across all roles
    pub fn total_writes(&self) -> u64 {
        self.inner
            .read()
            .map(|inner| inner.writes.values().sum())
            .unwrap_or(0)
    }
}

impl MetadataStore for MemoryStore {
    fn load(&self, role: &str) -> StoreResult<Vec<u8>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let version = inner
            .latest
            .get(role)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                role: role.to_string(),
            })?;

        inner
            .files
            .get(&metadata_filename(role, version))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                role: role.to_string(),
            })
    }

    fn load_version(&self, role: &str, version: u64) -> StoreResult<Vec<u8>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        if role == TIMESTAMP && inner.latest.get(role) != Some(&version) {
            return Err(StoreError::VersionNotFound {
                role: role.to_string(),
                version,
            });
        }

        inner
            .files
            .get(&metadata_filename(role, version))
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                role: role.to_string(),
                version,
            })
    }

    fn current_version(&self, role: &str) -> StoreResult<Option<u64>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.latest.get(role).copied())
    }

    fn persist(
        &self,
        role: &str,
        version: u64,
        expected_current: Option<u64>,
        bytes: &[u8],
    ) -> StoreResult<()> {
        validate_role_name(role)?;

        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let actual = inner.latest.get(role).copied();
        check_expected(role, version, expected_current, actual)?;

        inner
            .files
            .insert(metadata_filename(role, version), bytes.to_vec());
        inner.latest.insert(role.to_string(), version);
        *inner.writes.entry(role.to_string()).or_insert(0) += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_and_load_latest() {
        let store = MemoryStore::new();
        store.persist("snapshot", 1, None, b"v1").unwrap();
        store.persist("snapshot", 2, Some(1), b"v2").unwrap();

        assert_eq!(store.load("snapshot").unwrap(), b"v2");
        assert_eq!(store.load_version("snapshot", 1).unwrap(), b"v1");
        assert_eq!(store.current_version("snapshot").unwrap(), Some(2));
        assert!(store.contains_file("1.snapshot.json"));
        assert!(store.contains_file("2.snapshot.json"));
        assert_eq!(store.write_count("snapshot"), 2);
    }

    #[test]
    fn test_timestamp_is_single_file() {
        let store = MemoryStore::new();
        store.persist("timestamp", 1, None, b"t1").unwrap();
        store.persist("timestamp", 2, Some(1), b"t2").unwrap();

        assert_eq!(store.filenames(), vec!["timestamp.json".to_string()]);
        assert_eq!(store.load("timestamp").unwrap(), b"t2");
        assert!(matches!(
            store.load_version("timestamp", 1),
            Err(StoreError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_load_missing_role() {
        let store = MemoryStore::new();
        assert!(matches!(store.load("bin"), Err(StoreError::NotFound { .. })));
        assert_eq!(store.current_version("bin").unwrap(), None);
    }

    #[test]
    fn test_stale_writer_rejected() {
        let store = MemoryStore::new();
        store.persist("bins-0", 1, None, b"v1").unwrap();

        // Two writers both read version 1
        store.persist("bins-0", 2, Some(1), b"writer-a").unwrap();
        let result = store.persist("bins-0", 2, Some(1), b"writer-b");

        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
        assert_eq!(store.load("bins-0").unwrap(), b"writer-a");
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.persist("root", 1, None, b"r").unwrap();
        assert_eq!(other.load("root").unwrap(), b"r");
    }
}
