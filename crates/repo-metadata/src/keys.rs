//! Ed25519 keys and signers
//!
//! Public keys use the TUF key object `{keytype, scheme, keyval: {public}}`
//! with a hex-encoded public key. A key id is the SHA-256 of the canonical
//! (JCS) form of that object.

use std::fmt;

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MetadataError, MetadataResult};

/// Key type identifier for Ed25519 keys
pub const KEY_TYPE: &str = "ed25519";

/// Signature scheme identifier for Ed25519 keys
pub const KEY_SCHEME: &str = "ed25519";

/// Public key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    /// Hex-encoded public key bytes
    pub public: String,
}

/// A public key as declared in root or in a delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
}

impl Key {
    /// Build the key object for an Ed25519 verifying key
    pub fn ed25519(verifying_key: &VerifyingKey) -> Self {
        Self {
            keytype: KEY_TYPE.to_string(),
            scheme: KEY_SCHEME.to_string(),
            keyval: KeyVal {
                public: hex::encode(verifying_key.as_bytes()),
            },
        }
    }

    /// Compute the key id: hex SHA-256 over JCS(key)
    pub fn key_id(&self) -> MetadataResult<String> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| MetadataError::Canonicalization(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Decode the Ed25519 verifying key
    pub fn verifying_key(&self) -> MetadataResult<VerifyingKey> {
        if self.keytype != KEY_TYPE || self.scheme != KEY_SCHEME {
            return Err(MetadataError::UnsupportedKey {
                keytype: self.keytype.clone(),
                scheme: self.scheme.clone(),
            });
        }

        let bytes = hex::decode(&self.keyval.public)?;
        let bytes_array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MetadataError::InvalidKey("public key must be 32 bytes".to_string()))?;
        VerifyingKey::from_bytes(&bytes_array).map_err(|e| MetadataError::InvalidKey(e.to_string()))
    }

    /// Verify a hex-encoded signature over `message`
    ///
    /// Malformed signatures verify as `false`; only an unusable key is an error.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> MetadataResult<bool> {
        let verifying_key = self.verifying_key()?;

        let sig_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let signature = match DalekSignature::from_slice(&sig_bytes) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        Ok(verifying_key.verify(message, &signature).is_ok())
    }
}

/// An Ed25519 private key able to sign role metadata
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
    public: Key,
    key_id: String,
}

impl Ed25519Signer {
    /// Wrap an Ed25519 signing key
    pub fn new(signing_key: SigningKey) -> MetadataResult<Self> {
        let public = Key::ed25519(&signing_key.verifying_key());
        let key_id = public.key_id()?;
        Ok(Self {
            signing_key,
            public,
            key_id,
        })
    }

    /// Generate a fresh random key
    pub fn generate() -> MetadataResult<Self> {
        Self::new(SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Load from a base64-encoded 32-byte secret
    pub fn from_base64(encoded: &str) -> MetadataResult<Self> {
        Self::new(decode_signing_key(encoded)?)
    }

    /// Encode the secret as base64 for storage
    pub fn to_base64(&self) -> String {
        encode_signing_key(&self.signing_key)
    }

    /// The public key object for this signer
    pub fn public_key(&self) -> &Key {
        &self.public
    }

    /// The key id of the public key
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a message, returning the raw 64-byte signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> MetadataResult<SigningKey> {
    let bytes =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| MetadataError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes_array))
}
