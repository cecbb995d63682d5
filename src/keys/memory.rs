//! In-memory key store

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use repo_metadata::Ed25519Signer;

use super::{KeyError, KeyResult, KeyStore};

/// Key store holding signers in memory; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    keys: Arc<RwLock<HashMap<String, Vec<Ed25519Signer>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `signer` for `key_role`
    pub fn insert(&self, key_role: &str, signer: Ed25519Signer) -> KeyResult<()> {
        let mut keys = self.keys.write().map_err(|_| KeyError::Poisoned)?;
        keys.entry(key_role.to_string()).or_default().push(signer);
        Ok(())
    }

    /// Generate and authorize a new key for `key_role`
    pub fn generate(&self, key_role: &str) -> KeyResult<Ed25519Signer> {
        let signer = Ed25519Signer::generate()?;
        self.insert(key_role, signer.clone())?;
        Ok(signer)
    }

    /// Revoke every key of `key_role`
    pub fn clear(&self, key_role: &str) -> KeyResult<()> {
        let mut keys = self.keys.write().map_err(|_| KeyError::Poisoned)?;
        keys.remove(key_role);
        Ok(())
    }
}

impl KeyStore for MemoryKeyStore {
    fn keys_for(&self, key_role: &str) -> KeyResult<Vec<Ed25519Signer>> {
        let keys = self.keys.read().map_err(|_| KeyError::Poisoned)?;
        Ok(keys.get(key_role).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_by_role() {
        let store = MemoryKeyStore::new();
        let signer = store.generate("snapshot").unwrap();

        let keys = store.keys_for("snapshot").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key_id(), signer.key_id());
        assert!(store.keys_for("timestamp").unwrap().is_empty());

        store.clear("snapshot").unwrap();
        assert!(store.keys_for("snapshot").unwrap().is_empty());
    }
}
