//! Succinct hash-bin delegation
//!
//! A delegating targets role declares `2^bit_length` bins. Each target path
//! is assigned to exactly one bin by the leading `bit_length` bits of
//! SHA-256(path). Clients recompute the same assignment to find the bin to
//! fetch, so the mapping must never depend on anything but the path and the
//! delegation parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MetadataError, MetadataResult};
use crate::keys::Key;

/// Largest supported bit length (the hash prefix is a 32-bit integer)
pub const MAX_BIT_LENGTH: u32 = 32;

/// Delegations declared by a targets role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succinct_roles: Option<SuccinctRoles>,
}

/// Succinct hash-bin delegation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccinctRoles {
    pub keyids: Vec<String>,
    pub threshold: u32,
    pub bit_length: u32,
    pub name_prefix: String,
}

impl SuccinctRoles {
    pub fn new(
        keyids: Vec<String>,
        threshold: u32,
        bit_length: u32,
        name_prefix: impl Into<String>,
    ) -> MetadataResult<Self> {
        let roles = Self {
            keyids,
            threshold,
            bit_length,
            name_prefix: name_prefix.into(),
        };
        roles.validate()?;
        Ok(roles)
    }

    /// Reject parameters that cannot describe a bin layout
    pub fn validate(&self) -> MetadataResult<()> {
        if self.bit_length == 0 || self.bit_length > MAX_BIT_LENGTH {
            return Err(MetadataError::InvalidDelegation(format!(
                "bit_length must be in 1..={}, got {}",
                MAX_BIT_LENGTH, self.bit_length
            )));
        }
        if self.name_prefix.is_empty() {
            return Err(MetadataError::InvalidDelegation(
                "name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn number_of_bins(&self) -> u64 {
        1u64 << self.bit_length.min(MAX_BIT_LENGTH)
    }

    /// Hex digits in a bin suffix: the width of `number_of_bins - 1`
    pub fn suffix_len(&self) -> usize {
        format!("{:x}", self.number_of_bins() - 1).len()
    }

    /// Bin number for a target path
    pub fn bin_for_target(&self, target_path: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(target_path.as_bytes());
        let digest = hasher.finalize();

        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let shift = MAX_BIT_LENGTH.saturating_sub(self.bit_length);
        u64::from(prefix) >> shift
    }

    /// Name of the bin responsible for a target path
    pub fn role_for_target(&self, target_path: &str) -> String {
        self.role_name(self.bin_for_target(target_path))
    }

    /// Name of bin number `bin`, e.g. `bins-2` or `bins-0f`
    pub fn role_name(&self, bin: u64) -> String {
        format!(
            "{}-{:0width$x}",
            self.name_prefix,
            bin,
            width = self.suffix_len()
        )
    }

    /// All bin names in ascending bin order
    pub fn role_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.number_of_bins()).map(move |bin| self.role_name(bin))
    }

    /// Whether `role_name` is one of the bins of this delegation
    pub fn is_delegated_role(&self, role_name: &str) -> bool {
        let Some(suffix) = role_name
            .strip_prefix(self.name_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
        else {
            return false;
        };

        if suffix.len() != self.suffix_len() || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }
        if suffix.chars().any(|c| c.is_ascii_uppercase()) {
            return false;
        }

        match u64::from_str_radix(suffix, 16) {
            Ok(bin) => bin < self.number_of_bins(),
            Err(_) => false,
        }
    }
}
