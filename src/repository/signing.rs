//! Signing adapter
//!
//! Every signing pass discards the previous signature set and signs with all
//! keys the key store currently holds for the role's key role. Signatures made
//! over a superseded version/expiry pair are never carried forward.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use repo_metadata::{Key, Metadata, RolePayload, Root, Targets, BIN, ROOT};

use super::error::{RepositoryError, RepositoryResult};
use super::MetadataRepository;
use crate::role::RoleClass;

/// Keys, authorized key ids and threshold for one role
struct Authority {
    keys: BTreeMap<String, Key>,
    keyids: Vec<String>,
    threshold: u32,
}

impl MetadataRepository {
    /// Replace the signature set of `md` with fresh signatures for `role`
    ///
    /// Returns the number of signatures made. With no keys available the
    /// document is left unsigned unless thresholds are enforced.
    pub(crate) fn sign_role<T: RolePayload>(
        &self,
        md: &mut Metadata<T>,
        role: &str,
    ) -> RepositoryResult<usize> {
        let key_role = RoleClass::key_role(role);
        let signers = self.keys.keys_for(key_role)?;

        md.signatures.clear();
        for signer in &signers {
            md.sign(signer, true)
                .map_err(|e| RepositoryError::metadata(role, e))?;
        }

        if signers.is_empty() {
            if self.settings.enforce_threshold {
                return Err(RepositoryError::SigningUnavailable {
                    role: role.to_string(),
                    key_role: key_role.to_string(),
                });
            }
            warn!(role, key_role, "no signing keys available, document left unsigned");
            return Ok(0);
        }

        if self.settings.enforce_threshold {
            self.check_threshold(md, role)?;
        }

        debug!(role, signatures = signers.len(), "signed");
        Ok(signers.len())
    }

    fn check_threshold<T: RolePayload>(
        &self,
        md: &Metadata<T>,
        role: &str,
    ) -> RepositoryResult<()> {
        let authority = self.authority(role)?;
        let valid = md
            .count_valid_signatures(&authority.keys, &authority.keyids)
            .map_err(|e| RepositoryError::metadata(role, e))?;
        if valid < authority.threshold as usize {
            return Err(RepositoryError::ThresholdNotMet {
                role: role.to_string(),
                valid,
                threshold: authority.threshold,
            });
        }
        Ok(())
    }

    /// Resolve who may sign `role`
    ///
    /// Bins are authorized by the succinct delegation in `bin`; top-level
    /// roles by root.
    fn authority(&self, role: &str) -> RepositoryResult<Authority> {
        if RoleClass::of(role) == RoleClass::Bins {
            let bin = self.load::<Targets>(BIN)?;
            let delegations =
                bin.signed
                    .delegations
                    .ok_or_else(|| RepositoryError::MissingDelegation {
                        role: BIN.to_string(),
                    })?;
            let succinct = delegations
                .succinct_roles
                .ok_or_else(|| RepositoryError::MissingDelegation {
                    role: BIN.to_string(),
                })?;
            if !succinct.is_delegated_role(role) {
                return Err(RepositoryError::UnknownAuthority {
                    role: role.to_string(),
                });
            }
            return Ok(Authority {
                keys: delegations.keys,
                keyids: succinct.keyids,
                threshold: succinct.threshold,
            });
        }

        let root = self.load::<Root>(ROOT)?;
        let Some(role_keys) = root.signed.roles.get(role).cloned() else {
            return Err(RepositoryError::UnknownAuthority {
                role: role.to_string(),
            });
        };
        Ok(Authority {
            keys: root.signed.keys,
            keyids: role_keys.keyids,
            threshold: role_keys.threshold,
        })
    }
}
