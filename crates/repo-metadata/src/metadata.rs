//! Signed role documents
//!
//! Every role document is a `Metadata<T>` envelope: a list of signatures and
//! the `signed` payload. Signatures are computed over the JCS (RFC 8785)
//! canonical form of `signed`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::delegation::Delegations;
use crate::error::{MetadataError, MetadataResult};
use crate::keys::{Ed25519Signer, Key};
use crate::{SNAPSHOT, TIMESTAMP};

/// TUF format version written into new documents
pub const SPEC_VERSION: &str = "1.0.31";

/// Snapshot/timestamp meta key for a role, e.g. `bins-2.json`
pub fn meta_name(role_name: &str) -> String {
    format!("{}.json", role_name)
}

/// Serialize a value to its JCS canonical bytes
pub fn canonical_bytes<T: Serialize>(value: &T) -> MetadataResult<Vec<u8>> {
    serde_json_canonicalizer::to_vec(value)
        .map_err(|e| MetadataError::Canonicalization(e.to_string()))
}

/// Fields shared by every signed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHeader {
    /// Role type (`root`, `timestamp`, `snapshot`, `targets`)
    #[serde(rename = "_type")]
    pub role_type: String,

    pub spec_version: String,

    /// Monotonic document version, starting at 1
    pub version: u64,

    /// Expiration, second precision UTC
    pub expires: DateTime<Utc>,
}

impl SignedHeader {
    fn new(role_type: &str, expires: DateTime<Utc>) -> Self {
        Self {
            role_type: role_type.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
        }
    }
}

/// A role payload that can be wrapped in a [`Metadata`] envelope
pub trait RolePayload: Serialize + DeserializeOwned + Clone + fmt::Debug {
    /// Value of the `_type` field for this payload
    const TYPE: &'static str;

    fn header(&self) -> &SignedHeader;

    fn header_mut(&mut self) -> &mut SignedHeader;
}

/// A single signature over the canonical `signed` bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,

    /// Hex-encoded signature bytes
    pub sig: String,
}

/// Signing authority for a role: authorized key ids and threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// Version pointer to another role's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

impl MetaFile {
    pub fn with_version(version: u64) -> Self {
        Self {
            version,
            length: None,
            hashes: None,
        }
    }
}

/// Descriptor of a published artifact
///
/// The artifact path is the key under which the descriptor is stored in its
/// owning targets role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,

    /// Hash algorithm name to hex digest
    pub hashes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetFile {
    /// Describe artifact content by length and SHA-256
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);

        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), hex::encode(hasher.finalize()));

        Self {
            length: data.len() as u64,
            hashes,
            custom: None,
        }
    }

    /// Check the descriptor is usable for the given path
    pub fn validate(&self, path: &str) -> MetadataResult<()> {
        if path.is_empty() {
            return Err(MetadataError::InvalidTarget {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }
        if self.hashes.is_empty() {
            return Err(MetadataError::InvalidTarget {
                path: path.to_string(),
                reason: "at least one hash is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Root payload: trusted keys and per-role signing authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    #[serde(flatten)]
    pub header: SignedHeader,

    #[serde(default)]
    pub consistent_snapshot: bool,

    pub keys: BTreeMap<String, Key>,

    pub roles: BTreeMap<String, RoleKeys>,
}

impl Root {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            header: SignedHeader::new(Self::TYPE, expires),
            consistent_snapshot: true,
            keys: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }

    /// Authorize `key` for `role`, creating the role entry if needed
    pub fn add_key(&mut self, role: &str, key: Key) -> MetadataResult<()> {
        let keyid = key.key_id()?;
        let entry = self.roles.entry(role.to_string()).or_insert_with(|| RoleKeys {
            keyids: Vec::new(),
            threshold: 1,
        });
        if !entry.keyids.contains(&keyid) {
            entry.keyids.push(keyid.clone());
        }
        self.keys.insert(keyid, key);
        Ok(())
    }
}

impl RolePayload for Root {
    const TYPE: &'static str = "root";

    fn header(&self) -> &SignedHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SignedHeader {
        &mut self.header
    }
}

/// Timestamp payload: pointer to the current snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(flatten)]
    pub header: SignedHeader,

    pub meta: BTreeMap<String, MetaFile>,
}

impl Timestamp {
    pub fn new(expires: DateTime<Utc>, snapshot_version: u64) -> Self {
        let mut ts = Self {
            header: SignedHeader::new(Self::TYPE, expires),
            meta: BTreeMap::new(),
        };
        ts.set_snapshot_version(snapshot_version);
        ts
    }

    pub fn snapshot_meta(&self) -> Option<&MetaFile> {
        self.meta.get(&meta_name(SNAPSHOT))
    }

    /// Point at `version` of snapshot, replacing any previous pointer
    pub fn set_snapshot_version(&mut self, version: u64) {
        self.meta
            .insert(meta_name(SNAPSHOT), MetaFile::with_version(version));
    }
}

impl RolePayload for Timestamp {
    const TYPE: &'static str = TIMESTAMP;

    fn header(&self) -> &SignedHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SignedHeader {
        &mut self.header
    }
}

/// Snapshot payload: targets role name to recorded version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub header: SignedHeader,

    pub meta: BTreeMap<String, MetaFile>,
}

impl Snapshot {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            header: SignedHeader::new(Self::TYPE, expires),
            meta: BTreeMap::new(),
        }
    }

    /// Recorded version for a targets role, if any
    pub fn version_of(&self, role_name: &str) -> Option<u64> {
        self.meta.get(&meta_name(role_name)).map(|m| m.version)
    }

    pub fn set_version(&mut self, role_name: &str, version: u64) {
        self.meta
            .insert(meta_name(role_name), MetaFile::with_version(version));
    }

    /// Iterate `(role name, version)` for every recorded entry
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.meta.iter().map(|(name, meta)| {
            (name.strip_suffix(".json").unwrap_or(name.as_str()), meta.version)
        })
    }
}

impl RolePayload for Snapshot {
    const TYPE: &'static str = SNAPSHOT;

    fn header(&self) -> &SignedHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SignedHeader {
        &mut self.header
    }
}

/// Targets payload, used by the top-level targets role, the delegating
/// `bin` role and every hash bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(flatten)]
    pub header: SignedHeader,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

impl Targets {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            header: SignedHeader::new(Self::TYPE, expires),
            targets: BTreeMap::new(),
            delegations: None,
        }
    }

    /// Insert or overwrite the descriptor for `path`, returning the old one
    pub fn upsert(&mut self, path: impl Into<String>, file: TargetFile) -> Option<TargetFile> {
        self.targets.insert(path.into(), file)
    }
}

impl RolePayload for Targets {
    const TYPE: &'static str = "targets";

    fn header(&self) -> &SignedHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut SignedHeader {
        &mut self.header
    }
}

/// Signed metadata envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

impl<T: RolePayload> Metadata<T> {
    /// Wrap an unsigned payload
    pub fn new(signed: T) -> Self {
        Self {
            signatures: Vec::new(),
            signed,
        }
    }

    pub fn version(&self) -> u64 {
        self.signed.header().version
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.signed.header().expires
    }

    /// Parse from JSON bytes, rejecting payloads of another role type
    pub fn from_bytes(bytes: &[u8]) -> MetadataResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let actual = value
            .get("signed")
            .and_then(|s| s.get("_type"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        if actual != T::TYPE {
            return Err(MetadataError::TypeMismatch {
                expected: T::TYPE.to_string(),
                actual,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to pretty JSON for storage
    pub fn to_bytes(&self) -> MetadataResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Canonical bytes of `signed`, the message every signature covers
    pub fn signed_bytes(&self) -> MetadataResult<Vec<u8>> {
        canonical_bytes(&self.signed)
    }

    /// Sign with `signer`
    ///
    /// With `append` unset the existing signatures are dropped first. A
    /// signature already present for the same key id is replaced.
    pub fn sign(&mut self, signer: &Ed25519Signer, append: bool) -> MetadataResult<&Signature> {
        let message = self.signed_bytes()?;
        let signature = Signature {
            keyid: signer.key_id().to_string(),
            sig: hex::encode(signer.sign(&message)),
        };

        if append {
            self.signatures.retain(|s| s.keyid != signature.keyid);
        } else {
            self.signatures.clear();
        }
        self.signatures.push(signature);

        let last = self.signatures.len() - 1;
        Ok(&self.signatures[last])
    }

    /// Count distinct authorized key ids with a valid signature
    pub fn count_valid_signatures(
        &self,
        keys: &BTreeMap<String, Key>,
        authorized: &[String],
    ) -> MetadataResult<usize> {
        let message = self.signed_bytes()?;
        let mut seen: Vec<&str> = Vec::new();

        for signature in &self.signatures {
            if seen.contains(&signature.keyid.as_str())
                || !authorized.contains(&signature.keyid)
            {
                continue;
            }
            let Some(key) = keys.get(&signature.keyid) else {
                continue;
            };
            if key.verify(&message, &signature.sig)? {
                seen.push(&signature.keyid);
            }
        }

        Ok(seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expires() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_expires_serializes_with_z_suffix() {
        let md = Metadata::new(Snapshot::new(expires()));
        let json = String::from_utf8(md.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"expires\": \"2030-01-01T00:00:00Z\""));
        assert!(json.contains("\"_type\": \"snapshot\""));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let md = Metadata::new(Snapshot::new(expires()));
        let bytes = md.to_bytes().unwrap();

        let result = Metadata::<Timestamp>::from_bytes(&bytes);
        assert!(matches!(result, Err(MetadataError::TypeMismatch { .. })));

        let parsed = Metadata::<Snapshot>::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, md);
    }

    #[test]
    fn test_sign_replaces_signatures() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let mut md = Metadata::new(Targets::new(expires()));

        md.sign(&a, true).unwrap();
        md.sign(&b, true).unwrap();
        assert_eq!(md.signatures.len(), 2);

        md.sign(&a, false).unwrap();
        assert_eq!(md.signatures.len(), 1);
        assert_eq!(md.signatures[0].keyid, a.key_id());
    }

    #[test]
    fn test_append_same_key_does_not_duplicate() {
        let a = Ed25519Signer::generate().unwrap();
        let mut md = Metadata::new(Targets::new(expires()));

        md.sign(&a, true).unwrap();
        md.sign(&a, true).unwrap();
        assert_eq!(md.signatures.len(), 1);
    }

    #[test]
    fn test_count_valid_signatures() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let mut keys = BTreeMap::new();
        keys.insert(a.key_id().to_string(), a.public_key().clone());
        keys.insert(b.key_id().to_string(), b.public_key().clone());
        let authorized = vec![a.key_id().to_string()];

        let mut md = Metadata::new(Snapshot::new(expires()));
        md.sign(&a, true).unwrap();
        md.sign(&b, true).unwrap();

        // b signed but is not authorized
        assert_eq!(md.count_valid_signatures(&keys, &authorized).unwrap(), 1);

        // Signature no longer covers the changed payload
        md.signed.header.version += 1;
        assert_eq!(md.count_valid_signatures(&keys, &authorized).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_entries() {
        let mut snapshot = Snapshot::new(expires());
        snapshot.set_version("bins-0", 3);
        snapshot.set_version("bin", 1);

        assert_eq!(snapshot.version_of("bins-0"), Some(3));
        assert_eq!(snapshot.version_of("bins-1"), None);
        assert!(snapshot.meta.contains_key("bins-0.json"));

        let entries: Vec<_> = snapshot.entries().collect();
        assert_eq!(entries, vec![("bin", 1), ("bins-0", 3)]);
    }

    #[test]
    fn test_timestamp_snapshot_pointer() {
        let mut ts = Timestamp::new(expires(), 1);
        assert_eq!(ts.snapshot_meta().unwrap().version, 1);

        ts.set_snapshot_version(7);
        assert_eq!(ts.snapshot_meta().unwrap().version, 7);
        assert_eq!(ts.meta.len(), 1);
    }

    #[test]
    fn test_target_file_from_data() {
        let file = TargetFile::from_data(b"hello");
        assert_eq!(file.length, 5);
        assert_eq!(
            file.hashes["sha256"],
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(file.validate("a/b.tar.gz").is_ok());
    }

    #[test]
    fn test_target_file_requires_hash() {
        let file = TargetFile {
            length: 1,
            hashes: BTreeMap::new(),
            custom: None,
        };
        assert!(matches!(
            file.validate("x"),
            Err(MetadataError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_root_add_key() {
        let signer = Ed25519Signer::generate().unwrap();
        let mut root = Root::new(expires());
        root.add_key("snapshot", signer.public_key().clone()).unwrap();
        root.add_key("snapshot", signer.public_key().clone()).unwrap();

        let role = &root.roles["snapshot"];
        assert_eq!(role.keyids, vec![signer.key_id().to_string()]);
        assert_eq!(role.threshold, 1);
        assert!(root.keys.contains_key(signer.key_id()));
    }
}
