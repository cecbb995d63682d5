//! Key store reading base64 Ed25519 secrets from a directory
//!
//! Layout: `<keys_dir>/<key_role>/<name>.key`, one base64-encoded 32-byte
//! secret per file. Keys are returned sorted by file name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use repo_metadata::Ed25519Signer;

use super::{KeyError, KeyResult, KeyStore};

/// File extension of key files
pub const KEY_EXTENSION: &str = "key";

/// Directory-backed key store
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    root: PathBuf,
}

impl FileKeyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a key for `key_role` and write it with owner-only permissions
    ///
    /// Returns the new signer and the path it was written to.
    pub fn generate(&self, key_role: &str) -> KeyResult<(Ed25519Signer, PathBuf)> {
        let signer = Ed25519Signer::generate()?;
        let dir = self.root.join(key_role);
        fs::create_dir_all(&dir).map_err(|source| KeyError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{}.{}", &signer.key_id()[..16], KEY_EXTENSION));
        write_secret(&path, &signer.to_base64()).map_err(|source| KeyError::Io {
            path: path.clone(),
            source,
        })?;

        Ok((signer, path))
    }
}

#[cfg(unix)]
fn write_secret(path: &Path, contents: &str) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_secret(path: &Path, contents: &str) -> io::Result<()> {
    fs::write(path, format!("{}\n", contents))
}

impl KeyStore for FileKeyStore {
    fn keys_for(&self, key_role: &str) -> KeyResult<Vec<Ed25519Signer>> {
        let dir = self.root.join(key_role);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(KeyError::Io { path: dir, source }),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| KeyError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(KEY_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let encoded = fs::read_to_string(&path).map_err(|source| KeyError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ed25519Signer::from_base64(&encoded)
                    .map_err(|source| KeyError::InvalidKey { path, source })
            })
            .collect()
    }
}
