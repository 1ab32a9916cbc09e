//! The authority registry: creation, soft deactivation, listing, and
//! signing services over the authority tree.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

use crate::crypto::{derivation, keys::Ed25519KeyPair, signing};
use crate::error::{EatpError, Result};
use crate::ids::{self, AuthorityId};
use crate::time;

use super::authority::{Authority, AuthorityType};

/// Minimum length for a deactivation reason.
const MIN_REASON_LEN: usize = 10;

/// Sort key for authority listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthoritySortBy {
    #[default]
    CreatedAt,
    Name,
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

/// Filter for listing authorities. Unset fields impose no restriction;
/// set fields combine with logical AND.
#[derive(Debug, Clone, Default)]
pub struct AuthorityFilter {
    pub authority_type: Option<AuthorityType>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    pub sort_by: AuthoritySortBy,
    pub sort_order: SortOrder,
}

struct RegistryInner {
    authorities: HashMap<AuthorityId, Authority>,
    keys: HashMap<AuthorityId, Ed25519KeyPair>,
}

/// In-memory registry of trust-issuing authorities and their key pairs.
pub struct AuthorityRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for AuthorityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                authorities: HashMap::new(),
                keys: HashMap::new(),
            }),
        }
    }

    /// Restore a registry from snapshot parts.
    pub fn from_parts(
        authorities: Vec<Authority>,
        secret_keys: Vec<(AuthorityId, [u8; 32])>,
    ) -> Self {
        let registry = Self::new();
        {
            let mut inner = registry.write();
            for authority in authorities {
                inner.authorities.insert(authority.id.clone(), authority);
            }
            for (id, bytes) in secret_keys {
                inner
                    .keys
                    .insert(id, Ed25519KeyPair::from_signing_key_bytes(&bytes));
            }
        }
        registry
    }

    /// Register a new authority, generating its key pair.
    ///
    /// Rejects an empty name and a parent that is missing or inactive.
    pub fn create(
        &self,
        name: &str,
        authority_type: AuthorityType,
        parent_id: Option<&AuthorityId>,
    ) -> Result<Authority> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EatpError::Validation {
                field: "name".into(),
                message: "authority name must not be empty".into(),
            });
        }

        let mut inner = self.write();

        if let Some(parent_id) = parent_id {
            let parent = inner
                .authorities
                .get(parent_id)
                .ok_or_else(|| EatpError::NotFound(format!("authority {parent_id}")))?;
            if !parent.is_active {
                return Err(EatpError::ParentInactive {
                    authority_id: parent_id.to_string(),
                });
            }
        }

        let keypair = Ed25519KeyPair::generate();
        let public_bytes = keypair.verifying_key_bytes();
        let id = AuthorityId(ids::derive_id("aauth", &public_bytes));
        let certificate_hash = hex::encode(Sha256::digest(public_bytes));
        let now = time::now_micros();

        let authority = Authority {
            id: id.clone(),
            name: name.to_string(),
            authority_type,
            parent_authority_id: parent_id.cloned(),
            is_active: true,
            certificate_hash: Some(certificate_hash),
            created_at: now,
            updated_at: now,
            deactivation_reason: None,
        };

        log::info!("created {} authority {} ({})", authority_type.as_str(), name, id);

        inner.authorities.insert(id.clone(), authority.clone());
        inner.keys.insert(id, keypair);
        Ok(authority)
    }

    /// Soft-deactivate an authority with a mandatory reason (≥ 10 chars).
    ///
    /// Deactivation does not revoke trust the authority already issued —
    /// that is an explicit, separate revocation-engine call.
    pub fn deactivate(&self, id: &AuthorityId, reason: &str) -> Result<Authority> {
        if reason.trim().len() < MIN_REASON_LEN {
            return Err(EatpError::Validation {
                field: "reason".into(),
                message: format!("deactivation reason must be at least {MIN_REASON_LEN} characters"),
            });
        }

        let mut inner = self.write();
        let authority = inner
            .authorities
            .get_mut(id)
            .ok_or_else(|| EatpError::NotFound(format!("authority {id}")))?;

        if authority.is_active {
            authority.is_active = false;
            authority.deactivation_reason = Some(reason.trim().to_string());
            authority.updated_at = time::now_micros();
            log::info!("deactivated authority {id}: {}", reason.trim());
        }

        Ok(authority.clone())
    }

    /// Reactivate an authority. Purely administrative: chains revoked
    /// while it was inactive stay revoked; the authority may only issue
    /// new genesis trust going forward.
    pub fn reactivate(&self, id: &AuthorityId) -> Result<Authority> {
        let mut inner = self.write();
        let authority = inner
            .authorities
            .get_mut(id)
            .ok_or_else(|| EatpError::NotFound(format!("authority {id}")))?;

        if !authority.is_active {
            authority.is_active = true;
            authority.deactivation_reason = None;
            authority.updated_at = time::now_micros();
            log::info!("reactivated authority {id}");
        }

        Ok(authority.clone())
    }

    /// Fetch one authority by id.
    pub fn get(&self, id: &AuthorityId) -> Result<Authority> {
        self.read()
            .authorities
            .get(id)
            .cloned()
            .ok_or_else(|| EatpError::NotFound(format!("authority {id}")))
    }

    /// List authorities matching a filter.
    pub fn list(&self, filter: &AuthorityFilter) -> Vec<Authority> {
        let inner = self.read();
        let mut results: Vec<Authority> = inner
            .authorities
            .values()
            .filter(|authority| {
                if let Some(ty) = filter.authority_type {
                    if authority.authority_type != ty {
                        return false;
                    }
                }
                if let Some(active) = filter.is_active {
                    if authority.is_active != active {
                        return false;
                    }
                }
                if let Some(search) = &filter.search {
                    if !authority
                        .name
                        .to_lowercase()
                        .contains(&search.to_lowercase())
                    {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        match filter.sort_by {
            AuthoritySortBy::CreatedAt => results.sort_by_key(|a| a.created_at),
            AuthoritySortBy::Name => results.sort_by(|a, b| a.name.cmp(&b.name)),
        }
        if filter.sort_order == SortOrder::Descending {
            results.reverse();
        }
        results
    }

    /// The authority and all authorities below it in the tree, in BFS order.
    pub fn descendants_of(&self, id: &AuthorityId) -> Result<Vec<AuthorityId>> {
        let inner = self.read();
        if !inner.authorities.contains_key(id) {
            return Err(EatpError::NotFound(format!("authority {id}")));
        }

        let mut order = vec![id.clone()];
        let mut index = 0;
        while index < order.len() {
            let current = order[index].clone();
            index += 1;
            for child in inner.authorities.values() {
                if child.parent_authority_id.as_ref() == Some(&current) {
                    order.push(child.id.clone());
                }
            }
        }
        Ok(order)
    }

    /// Whether `id` equals `ancestor` or sits below it in the tree.
    pub fn is_descendant_of(&self, id: &AuthorityId, ancestor: &AuthorityId) -> bool {
        let inner = self.read();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            if &current == ancestor {
                return true;
            }
            cursor = inner
                .authorities
                .get(&current)
                .and_then(|a| a.parent_authority_id.clone());
        }
        false
    }

    // ── Signing services ──────────────────────────────────────────────────

    /// Sign a message with an authority's root key; base64 signature.
    pub fn sign(&self, id: &AuthorityId, message: &[u8]) -> Result<String> {
        let inner = self.read();
        let keypair = inner
            .keys
            .get(id)
            .ok_or_else(|| EatpError::NotFound(format!("signing key for authority {id}")))?;
        Ok(signing::sign_to_base64(keypair.signing_key(), message))
    }

    /// Clone of an authority's root signing key, for anchor signing.
    pub fn signing_key(&self, id: &AuthorityId) -> Result<SigningKey> {
        let inner = self.read();
        let keypair = inner
            .keys
            .get(id)
            .ok_or_else(|| EatpError::NotFound(format!("signing key for authority {id}")))?;
        Ok(keypair.signing_key().clone())
    }

    /// An authority's public key, base64-encoded.
    pub fn public_key_base64(&self, id: &AuthorityId) -> Result<String> {
        let inner = self.read();
        let keypair = inner
            .keys
            .get(id)
            .ok_or_else(|| EatpError::NotFound(format!("signing key for authority {id}")))?;
        Ok(keypair.public_key_base64())
    }

    /// Derive the revocation signing key an authority uses for one node.
    pub fn revocation_signing_key(&self, id: &AuthorityId, node_id: &str) -> Result<SigningKey> {
        let inner = self.read();
        let keypair = inner
            .keys
            .get(id)
            .ok_or_else(|| EatpError::NotFound(format!("signing key for authority {id}")))?;
        derivation::derive_signing_key(
            &keypair.signing_key_bytes(),
            &derivation::revocation_context(node_id),
        )
    }

    /// Dump the registry for snapshotting: authorities plus raw signing
    /// key bytes. Callers must encrypt the result before persisting.
    pub fn export_parts(&self) -> (Vec<Authority>, Vec<(AuthorityId, [u8; 32])>) {
        let inner = self.read();
        let authorities = inner.authorities.values().cloned().collect();
        let secret_keys = inner
            .keys
            .iter()
            .map(|(id, keypair)| (id.clone(), keypair.signing_key_bytes()))
            .collect();
        (authorities, secret_keys)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_authority() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        assert!(org.id.as_str().starts_with("aauth_"));
        assert!(org.is_active);
        assert!(org.certificate_hash.is_some());
        assert!(org.parent_authority_id.is_none());
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let registry = AuthorityRegistry::new();
        let err = registry
            .create("   ", AuthorityType::System, None)
            .unwrap_err();
        assert!(matches!(err, EatpError::Validation { .. }));
    }

    #[test]
    fn test_create_under_inactive_parent_rejected() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        registry
            .deactivate(&org.id, "migrated to new tenant")
            .unwrap();

        let err = registry
            .create("CI System", AuthorityType::System, Some(&org.id))
            .unwrap_err();
        assert!(matches!(err, EatpError::ParentInactive { .. }));
    }

    #[test]
    fn test_deactivate_requires_reason() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        let err = registry.deactivate(&org.id, "too short").unwrap_err();
        assert!(matches!(err, EatpError::Validation { field, .. } if field == "reason"));

        let deactivated = registry
            .deactivate(&org.id, "compliance hold pending review")
            .unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(
            deactivated.deactivation_reason.as_deref(),
            Some("compliance hold pending review")
        );
    }

    #[test]
    fn test_reactivate_is_administrative() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        registry
            .deactivate(&org.id, "compliance hold pending review")
            .unwrap();

        let reactivated = registry.reactivate(&org.id).unwrap();
        assert!(reactivated.is_active);
        assert!(reactivated.deactivation_reason.is_none());
    }

    #[test]
    fn test_list_filters_and_sorting() {
        let registry = AuthorityRegistry::new();
        registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        registry
            .create("Build System", AuthorityType::System, None)
            .unwrap();
        let human = registry
            .create("Dana Ops", AuthorityType::Human, None)
            .unwrap();
        registry
            .deactivate(&human.id, "left the organization")
            .unwrap();

        let humans = registry.list(&AuthorityFilter {
            authority_type: Some(AuthorityType::Human),
            ..Default::default()
        });
        assert_eq!(humans.len(), 1);

        let active = registry.list(&AuthorityFilter {
            is_active: Some(true),
            ..Default::default()
        });
        assert_eq!(active.len(), 2);

        let by_name = registry.list(&AuthorityFilter {
            sort_by: AuthoritySortBy::Name,
            sort_order: SortOrder::Ascending,
            ..Default::default()
        });
        assert_eq!(by_name[0].name, "Acme Corp");

        let searched = registry.list(&AuthorityFilter {
            search: Some("build".into()),
            ..Default::default()
        });
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].name, "Build System");
    }

    #[test]
    fn test_descendants_traversal() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        let team = registry
            .create("Platform Team", AuthorityType::Organization, Some(&org.id))
            .unwrap();
        let human = registry
            .create("Dana Ops", AuthorityType::Human, Some(&team.id))
            .unwrap();
        registry
            .create("Unrelated Org", AuthorityType::Organization, None)
            .unwrap();

        let descendants = registry.descendants_of(&org.id).unwrap();
        assert_eq!(descendants.len(), 3);
        assert_eq!(descendants[0], org.id);

        assert!(registry.is_descendant_of(&human.id, &org.id));
        assert!(registry.is_descendant_of(&org.id, &org.id));
        assert!(!registry.is_descendant_of(&org.id, &human.id));
    }

    #[test]
    fn test_sign_and_verify_with_public_key() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        let message = b"anchor content hash";
        let signature = registry.sign(&org.id, message).unwrap();
        let public_key = registry.public_key_base64(&org.id).unwrap();
        assert!(crate::crypto::signing::verify_with_key_base64(&public_key, message, &signature)
            .is_ok());
    }

    #[test]
    fn test_revocation_keys_scoped_per_node() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        let a = registry.revocation_signing_key(&org.id, "adeleg_a").unwrap();
        let b = registry.revocation_signing_key(&org.id, "adeleg_b").unwrap();
        assert_ne!(a.verifying_key().to_bytes(), b.verifying_key().to_bytes());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_keys() {
        let registry = AuthorityRegistry::new();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        let before = registry.public_key_base64(&org.id).unwrap();

        let (authorities, secret_keys) = registry.export_parts();
        let restored = AuthorityRegistry::from_parts(authorities, secret_keys);
        let after = restored.public_key_base64(&org.id).unwrap();
        assert_eq!(before, after);
    }
}
