//! Metadata store on the local filesystem
//!
//! Layout: `<root>/<version>.<role>.json` for every role but timestamp,
//! `<root>/timestamp.json` for timestamp.
//!
//! - Atomic writes via write-to-temp, fsync, rename, fsync(dir)
//! - Check-and-write under a per-role advisory lock, so writers in other
//!   processes cannot both move a role to the same next version
//! - `<root>/.latest/<role>` holds the last version written for a role, so
//!   resolving the current version never lists the directory. The pointer
//!   is a lower bound: a reader steps forward past any newer document left
//!   by a writer that died before updating it.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use repo_metadata::TIMESTAMP;

use super::lock::RoleLock;
use super::{
    check_expected, metadata_filename, parse_filename, validate_role_name, MetadataStore,
    StoreError, StoreResult,
};

/// Just enough of a document to read its version
#[derive(Deserialize)]
struct VersionProbe {
    signed: VersionProbeSigned,
}

#[derive(Deserialize)]
struct VersionProbeSigned {
    version: u64,
}

/// Directory-backed metadata store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    /// Directory holding per-role version pointers
    pub const LATEST_DIR: &'static str = ".latest";

    /// Open (creating if needed) a store rooted at `root`
    pub fn new(root: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self { root, lock_timeout })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, role: &str, version: u64) -> PathBuf {
        self.root.join(metadata_filename(role, version))
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }

    fn pointer_path(&self, role: &str) -> PathBuf {
        self.root.join(Self::LATEST_DIR).join(role)
    }

    /// Highest version on disk for a versioned role
    fn latest_versioned(&self, role: &str) -> StoreResult<Option<u64>> {
        let mut latest = match self.read_pointer(role)? {
            Some(version) => version,
            None => match self.scan_latest(role)? {
                Some(version) => version,
                None => return Ok(None),
            },
        };
        while self.path_for(role, latest + 1).exists() {
            latest += 1;
        }
        Ok(Some(latest))
    }

    fn read_pointer(&self, role: &str) -> StoreResult<Option<u64>> {
        let path = self.pointer_path(role);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match contents.trim().parse() {
            Ok(version) => Ok(Some(version)),
            Err(_) => {
                tracing::warn!(role, path = %path.display(), "unreadable version pointer, scanning");
                Ok(None)
            }
        }
    }

    /// Directory listing fallback for roles without a pointer
    fn scan_latest(&self, role: &str) -> StoreResult<Option<u64>> {
        let mut latest = None;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((version, file_role)) = parse_filename(name) {
                if file_role == role && latest.map_or(true, |l| version > l) {
                    latest = Some(version);
                }
            }
        }
        Ok(latest)
    }

    fn timestamp_version(&self) -> StoreResult<Option<u64>> {
        let path = self.path_for(TIMESTAMP, 0);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let probe: VersionProbe = serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unreadable {}: {}", path.display(), e),
            )
        })?;
        Ok(Some(probe.signed.version))
    }

    /// Write `bytes` to `target` atomically and durably
    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> StoreResult<()> {
        let parent = target.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;
        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir)?;

        let temp_path = temp_dir.join(format!(".tmp.{}.{}", std::process::id(), uuid::Uuid::new_v4()));

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, target)?;
            sync_dir(parent)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl MetadataStore for FileStore {
    fn load(&self, role: &str) -> StoreResult<Vec<u8>> {
        validate_role_name(role)?;

        let path = if role == TIMESTAMP {
            self.path_for(TIMESTAMP, 0)
        } else {
            match self.latest_versioned(role)? {
                Some(version) => self.path_for(role, version),
                None => {
                    return Err(StoreError::NotFound {
                        role: role.to_string(),
                    })
                }
            }
        };

        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                role: role.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn load_version(&self, role: &str, version: u64) -> StoreResult<Vec<u8>> {
        validate_role_name(role)?;

        let not_found = || StoreError::VersionNotFound {
            role: role.to_string(),
            version,
        };

        if role == TIMESTAMP && self.timestamp_version()? != Some(version) {
            return Err(not_found());
        }

        match fs::read(self.path_for(role, version)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    fn current_version(&self, role: &str) -> StoreResult<Option<u64>> {
        validate_role_name(role)?;

        if role == TIMESTAMP {
            self.timestamp_version()
        } else {
            self.latest_versioned(role)
        }
    }

    fn persist(
        &self,
        role: &str,
        version: u64,
        expected_current: Option<u64>,
        bytes: &[u8],
    ) -> StoreResult<()> {
        validate_role_name(role)?;

        let _lock = RoleLock::acquire(&self.root, role, self.lock_timeout)?;

        let actual = self.current_version(role)?;
        check_expected(role, version, expected_current, actual)?;

        let target = self.path_for(role, version);
        self.write_atomic(&target, bytes)?;
        if role != TIMESTAMP {
            self.write_atomic(&self.pointer_path(role), version.to_string().as_bytes())?;
        }

        tracing::debug!(role, version, path = %target.display(), "metadata written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(version: u64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "signatures": [],
            "signed": {"version": version}
        }))
        .unwrap()
    }

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("metadata"), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_versioned_filenames() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("snapshot", 1, None, &doc(1)).unwrap();
        store.persist("snapshot", 2, Some(1), &doc(2)).unwrap();

        assert!(store.root().join("1.snapshot.json").exists());
        assert!(store.root().join("2.snapshot.json").exists());
        assert_eq!(store.current_version("snapshot").unwrap(), Some(2));
        assert_eq!(store.load("snapshot").unwrap(), doc(2));
        assert_eq!(store.load_version("snapshot", 1).unwrap(), doc(1));
    }

    #[test]
    fn test_timestamp_not_version_prefixed() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("timestamp", 1, None, &doc(1)).unwrap();
        store.persist("timestamp", 2, Some(1), &doc(2)).unwrap();

        assert!(store.root().join("timestamp.json").exists());
        assert!(!store.root().join("2.timestamp.json").exists());
        assert_eq!(store.current_version("timestamp").unwrap(), Some(2));
        assert_eq!(store.load("timestamp").unwrap(), doc(2));
    }

    #[test]
    fn test_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(matches!(store.load("bin"), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.load("timestamp"), Err(StoreError::NotFound { .. })));
        assert!(matches!(
            store.load_version("bins-0", 4),
            Err(StoreError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_roles_with_shared_prefix_are_distinct() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("bin", 1, None, &doc(1)).unwrap();
        store.persist("bins-0", 1, None, &doc(1)).unwrap();
        store.persist("bins-0", 2, Some(1), &doc(2)).unwrap();

        assert_eq!(store.current_version("bin").unwrap(), Some(1));
        assert_eq!(store.current_version("bins-0").unwrap(), Some(2));
    }

    #[test]
    fn test_conflicting_write_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("bins-1", 1, None, &doc(1)).unwrap();
        store.persist("bins-1", 2, Some(1), &doc(2)).unwrap();

        let result = store.persist("bins-1", 2, Some(1), &doc(2));
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[test]
    fn test_invalid_role_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let result = store.persist("../escape", 1, None, &doc(1));
        assert!(matches!(result, Err(StoreError::InvalidRoleName(_))));
    }

    #[test]
    fn test_latest_resolves_after_many_versions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("bins-0", 1, None, &doc(1)).unwrap();
        for version in 2..=200 {
            store.persist("bins-0", version, Some(version - 1), &doc(version)).unwrap();
        }
        store.persist("bins-1", 1, None, &doc(1)).unwrap();

        assert_eq!(store.current_version("bins-0").unwrap(), Some(200));
        assert_eq!(store.load("bins-0").unwrap(), doc(200));
        assert_eq!(store.current_version("bins-1").unwrap(), Some(1));
        let pointer = fs::read_to_string(store.root().join(FileStore::LATEST_DIR).join("bins-0"));
        assert_eq!(pointer.unwrap(), "200");
    }

    #[test]
    fn test_lookup_follows_pointer_not_listing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("bins-2", 1, None, &doc(1)).unwrap();
        store.persist("bins-2", 2, Some(1), &doc(2)).unwrap();
        // Not reachable from the pointer, so never current
        fs::write(store.root().join("9.bins-2.json"), doc(9)).unwrap();

        assert_eq!(store.current_version("bins-2").unwrap(), Some(2));
    }

    #[test]
    fn test_pointer_behind_rolls_forward() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("snapshot", 1, None, &doc(1)).unwrap();
        // A writer that died between the document and the pointer
        fs::write(store.root().join("2.snapshot.json"), doc(2)).unwrap();

        assert_eq!(store.current_version("snapshot").unwrap(), Some(2));
        store.persist("snapshot", 3, Some(2), &doc(3)).unwrap();
        assert_eq!(store.load("snapshot").unwrap(), doc(3));
    }

    #[test]
    fn test_missing_pointer_falls_back_to_listing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("bin", 1, None, &doc(1)).unwrap();
        store.persist("bin", 2, Some(1), &doc(2)).unwrap();
        fs::remove_file(store.root().join(FileStore::LATEST_DIR).join("bin")).unwrap();

        assert_eq!(store.current_version("bin").unwrap(), Some(2));
        assert_eq!(store.load("bin").unwrap(), doc(2));
    }

    #[test]
    fn test_temp_files_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist("root", 1, None, &doc(1)).unwrap();
        let leftovers = fs::read_dir(store.root().join(".tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
