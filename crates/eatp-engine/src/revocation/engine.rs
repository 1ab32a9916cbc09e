//! Cascade revocation over the delegation graph.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::authority::{AuthorityRegistry, AuthorityType};
use crate::chain::{RevocationTarget, TrustChainStore};
use crate::error::{EatpError, Result};
use crate::ids::{AgentId, AuthorityId};
use crate::time;

use super::record::RevocationRecord;

/// Result of a revocation call.
#[derive(Debug, Clone)]
pub struct RevocationOutcome {
    /// Every agent invalidated by the cascade, in traversal order.
    pub revoked_agent_ids: Vec<AgentId>,
    /// Signed records emitted for newly revoked nodes. Empty when the call
    /// was an idempotent no-op.
    pub records: Vec<RevocationRecord>,
}

/// Read-only impact estimate for a confirmation flow.
#[derive(Debug, Clone)]
pub struct ImpactPreview {
    pub affected_agent_ids: Vec<AgentId>,
}

/// Revokes graph nodes and cascades to all descendants.
pub struct RevocationEngine {
    store: Arc<TrustChainStore>,
    registry: Arc<AuthorityRegistry>,
    /// Log of every signed revocation record emitted by this engine.
    records: Mutex<Vec<RevocationRecord>>,
}

impl RevocationEngine {
    pub fn new(store: Arc<TrustChainStore>, registry: Arc<AuthorityRegistry>) -> Self {
        Self {
            store,
            registry,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Restore the record log from a snapshot.
    pub fn with_records(
        store: Arc<TrustChainStore>,
        registry: Arc<AuthorityRegistry>,
        records: Vec<RevocationRecord>,
    ) -> Self {
        Self {
            store,
            registry,
            records: Mutex::new(records),
        }
    }

    /// Revoke a node and every descendant reachable through delegation
    /// edges. Idempotent and monotonic.
    pub fn revoke(&self, target: &RevocationTarget, reason: &str) -> Result<RevocationOutcome> {
        let now = time::now_micros();
        let outcome = self.store.cascade_revoke(target, reason, now)?;

        let mut records = Vec::new();
        if outcome.newly_revoked {
            if let Some(authority_id) = &outcome.root_authority {
                records.push(self.sign_record(target.node_id(), authority_id, reason, now)?);
            }
        }

        self.append_records(&records);
        Ok(RevocationOutcome {
            revoked_agent_ids: outcome.revoked_agent_ids,
            records,
        })
    }

    /// Revoke every genesis chain issued by a human authority or any of
    /// its descendant authorities, cascading each.
    pub fn revoke_by_human(
        &self,
        human_authority_id: &AuthorityId,
        reason: &str,
    ) -> Result<RevocationOutcome> {
        let authority = self.registry.get(human_authority_id)?;
        if authority.authority_type != AuthorityType::Human {
            return Err(EatpError::Validation {
                field: "human_authority_id".into(),
                message: format!(
                    "authority {human_authority_id} is {}, not human",
                    authority.authority_type.as_str()
                ),
            });
        }

        let authority_set: HashSet<AuthorityId> = self
            .registry
            .descendants_of(human_authority_id)?
            .into_iter()
            .collect();

        let now = time::now_micros();
        let outcome = self
            .store
            .revoke_by_authorities(&authority_set, reason, now)?;

        let mut records = Vec::with_capacity(outcome.revoked_genesis.len());
        for (agent_id, authority_id) in &outcome.revoked_genesis {
            records.push(self.sign_record(agent_id.as_str(), authority_id, reason, now)?);
        }

        self.append_records(&records);
        Ok(RevocationOutcome {
            revoked_agent_ids: outcome.revoked_agent_ids,
            records,
        })
    }

    /// The agents a revocation would affect, without mutating anything.
    pub fn preview_impact(&self, target: &RevocationTarget) -> Result<ImpactPreview> {
        Ok(ImpactPreview {
            affected_agent_ids: self.store.preview_impact(target)?,
        })
    }

    /// All signed revocation records emitted so far.
    pub fn records(&self) -> Vec<RevocationRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn sign_record(
        &self,
        node_id: &str,
        authority_id: &AuthorityId,
        reason: &str,
        now: u64,
    ) -> Result<RevocationRecord> {
        let key = self
            .registry
            .revocation_signing_key(authority_id, node_id)?;
        Ok(RevocationRecord::create(
            node_id,
            authority_id.clone(),
            reason,
            now,
            &key,
        ))
    }

    fn append_records(&self, records: &[RevocationRecord]) {
        if records.is_empty() {
            return;
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityAttestation, CapabilityType};
    use crate::chain::{DelegationRecord, TrustChain, TrustStatus};

    fn setup() -> (Arc<TrustChainStore>, Arc<AuthorityRegistry>, RevocationEngine) {
        let store = Arc::new(TrustChainStore::new());
        let registry = Arc::new(AuthorityRegistry::new());
        let engine = RevocationEngine::new(Arc::clone(&store), Arc::clone(&registry));
        (store, registry, engine)
    }

    fn establish(store: &TrustChainStore, agent: &str, authority: &AuthorityId) {
        let now = time::now_micros();
        store
            .establish(
                TrustChain {
                    agent_id: AgentId::from(agent),
                    issuing_authority_id: authority.clone(),
                    capabilities: vec![CapabilityAttestation::new(
                        "read_db",
                        CapabilityType::Access,
                        authority.as_str(),
                        now,
                    )],
                    constraints: Vec::new(),
                    status: TrustStatus::Valid,
                    expires_at: None,
                    established_at: now,
                    revoked_at: None,
                    revoked_reason: None,
                },
                now,
            )
            .unwrap();
    }

    fn delegate(store: &TrustChainStore, from: &str, to: &str) {
        let delegator = AgentId::from(from);
        let now = time::now_micros();
        let version = store.lineage_version(&delegator);
        let parent = store
            .resolve_path(&delegator)
            .unwrap()
            .last()
            .map(|record| record.id.clone());
        let record = DelegationRecord::new(
            delegator,
            AgentId::from(to),
            "t1",
            vec!["read_db".into()],
            Vec::new(),
            now,
            None,
            parent,
        );
        store.insert_delegation(record, version, now).unwrap();
    }

    #[test]
    fn test_revoke_emits_verifiable_record() {
        let (store, registry, engine) = setup();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        establish(&store, "a1", &org.id);
        delegate(&store, "a1", "a2");

        let outcome = engine
            .revoke(
                &RevocationTarget::Agent(AgentId::from("a1")),
                "policy violation",
            )
            .unwrap();

        assert_eq!(
            outcome.revoked_agent_ids,
            vec![AgentId::from("a1"), AgentId::from("a2")]
        );
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].verify_signature().is_ok());
        assert_eq!(engine.records().len(), 1);
    }

    #[test]
    fn test_repeat_revoke_emits_no_record() {
        let (store, registry, engine) = setup();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        establish(&store, "a1", &org.id);

        let first = engine
            .revoke(&RevocationTarget::Agent(AgentId::from("a1")), "policy violation")
            .unwrap();
        let second = engine
            .revoke(&RevocationTarget::Agent(AgentId::from("a1")), "again")
            .unwrap();

        assert_eq!(first.revoked_agent_ids, second.revoked_agent_ids);
        assert!(second.records.is_empty());
        assert_eq!(engine.records().len(), 1);
    }

    #[test]
    fn test_revoke_by_human_covers_descendant_authorities() {
        let (store, registry, engine) = setup();
        let human = registry
            .create("Dana Ops", AuthorityType::Human, None)
            .unwrap();
        let sub = registry
            .create("Dana's Lab", AuthorityType::System, Some(&human.id))
            .unwrap();
        let other = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        establish(&store, "h1", &human.id);
        establish(&store, "s1", &sub.id);
        establish(&store, "o1", &other.id);
        delegate(&store, "h1", "h2");

        let outcome = engine
            .revoke_by_human(&human.id, "operator offboarded")
            .unwrap();

        let affected: HashSet<AgentId> = outcome.revoked_agent_ids.iter().cloned().collect();
        assert!(affected.contains(&AgentId::from("h1")));
        assert!(affected.contains(&AgentId::from("h2")));
        assert!(affected.contains(&AgentId::from("s1")));
        assert!(!affected.contains(&AgentId::from("o1")));
        assert_eq!(outcome.records.len(), 2);
        for record in &outcome.records {
            assert!(record.verify_signature().is_ok());
        }
    }

    #[test]
    fn test_revoke_by_human_rejects_non_human() {
        let (_store, registry, engine) = setup();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();

        let err = engine
            .revoke_by_human(&org.id, "should not work")
            .unwrap_err();
        assert!(matches!(err, EatpError::Validation { .. }));
    }

    #[test]
    fn test_preview_matches_revoke() {
        let (store, registry, engine) = setup();
        let org = registry
            .create("Acme Corp", AuthorityType::Organization, None)
            .unwrap();
        establish(&store, "a1", &org.id);
        delegate(&store, "a1", "a2");
        delegate(&store, "a2", "a3");

        let target = RevocationTarget::Agent(AgentId::from("a1"));
        let preview = engine.preview_impact(&target).unwrap();
        let outcome = engine.revoke(&target, "policy violation").unwrap();
        assert_eq!(preview.affected_agent_ids, outcome.revoked_agent_ids);
    }
}
