//! The EATP engine facade — the verb surface an application layer calls.
//!
//! Wires the authority registry, trust chain store, audit ledger, and the
//! delegation / verification / revocation engines behind the protocol
//! verbs: `ESTABLISH`, `VERIFY`, `DELEGATE`, `AUDIT`, `REVOKE`, plus the
//! query and export surface. The verbs are not idempotent: every
//! `delegate` and `audit` call creates a new record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{
    export_csv, export_json, query_anchors, AuditAnchor, AuditLedger, AuditQuery, AuditResult,
    ChainVerification,
};
use crate::authority::{Authority, AuthorityFilter, AuthorityRegistry, AuthorityType};
use crate::capability::{CapabilityAttestation, CapabilityType, Constraint, ConstraintContext, EffectiveGrant};
use crate::chain::{
    ChainQuery, DelegationRecord, RevocationTarget, TrustChain, TrustChainStore, TrustStatus,
};
use crate::delegation::{DelegateRequest, DelegationEngine};
use crate::error::{EatpError, Result};
use crate::ids::{AgentId, AuthorityId};
use crate::revocation::{ImpactPreview, RevocationEngine, RevocationOutcome, RevocationRecord};
use crate::time;
use crate::verify::{VerificationEngine, VerificationLevel, VerificationResult};

/// Full serializable dump of engine state, used by the storage layer.
///
/// Contains raw authority signing keys (base64); callers must encrypt the
/// snapshot before persisting it.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub authorities: Vec<Authority>,
    pub authority_keys: Vec<(AuthorityId, String)>,
    pub chains: Vec<TrustChain>,
    pub archived_chains: Vec<TrustChain>,
    pub delegations: Vec<DelegationRecord>,
    pub revocation_records: Vec<RevocationRecord>,
    pub anchors: Vec<AuditAnchor>,
}

/// The assembled EATP engine.
pub struct EatpEngine {
    registry: Arc<AuthorityRegistry>,
    store: Arc<TrustChainStore>,
    ledger: Arc<AuditLedger>,
    delegation: DelegationEngine,
    verification: VerificationEngine,
    revocation: RevocationEngine,
}

impl Default for EatpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EatpEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::assemble(
            Arc::new(AuthorityRegistry::new()),
            Arc::new(TrustChainStore::new()),
            Arc::new(AuditLedger::new()),
            Vec::new(),
        )
    }

    fn assemble(
        registry: Arc<AuthorityRegistry>,
        store: Arc<TrustChainStore>,
        ledger: Arc<AuditLedger>,
        revocation_records: Vec<RevocationRecord>,
    ) -> Self {
        let delegation = DelegationEngine::new(Arc::clone(&store));
        let verification = VerificationEngine::new(Arc::clone(&store));
        let revocation = RevocationEngine::with_records(
            Arc::clone(&store),
            Arc::clone(&registry),
            revocation_records,
        );
        Self {
            registry,
            store,
            ledger,
            delegation,
            verification,
            revocation,
        }
    }

    // ── Authority administration ──────────────────────────────────────────

    pub fn create_authority(
        &self,
        name: &str,
        authority_type: AuthorityType,
        parent_id: Option<&AuthorityId>,
    ) -> Result<Authority> {
        self.registry.create(name, authority_type, parent_id)
    }

    pub fn deactivate_authority(&self, id: &AuthorityId, reason: &str) -> Result<Authority> {
        self.registry.deactivate(id, reason)
    }

    pub fn reactivate_authority(&self, id: &AuthorityId) -> Result<Authority> {
        self.registry.reactivate(id)
    }

    pub fn get_authority(&self, id: &AuthorityId) -> Result<Authority> {
        self.registry.get(id)
    }

    pub fn list_authorities(&self, filter: &AuthorityFilter) -> Vec<Authority> {
        self.registry.list(filter)
    }

    // ── ESTABLISH ─────────────────────────────────────────────────────────

    /// Establish genesis trust for an agent under an authority.
    ///
    /// An inactive authority cannot issue new genesis trust.
    pub fn establish(
        &self,
        agent_id: AgentId,
        authority_id: &AuthorityId,
        capabilities: Vec<(String, CapabilityType)>,
        constraints: Vec<Constraint>,
        expires_at: Option<u64>,
    ) -> Result<TrustChain> {
        let authority = self.registry.get(authority_id)?;
        if !authority.is_active {
            return Err(EatpError::AuthorityInactive {
                authority_id: authority_id.to_string(),
            });
        }
        if capabilities.is_empty() {
            return Err(EatpError::Validation {
                field: "capabilities".into(),
                message: "genesis trust must grant at least one capability".into(),
            });
        }

        let now = time::now_micros();
        let attestations = capabilities
            .into_iter()
            .map(|(uri, capability_type)| {
                let mut attestation = CapabilityAttestation::new(
                    uri,
                    capability_type,
                    authority_id.as_str(),
                    now,
                );
                if let Some(expiry) = expires_at {
                    attestation = attestation.with_expiry(expiry);
                }
                attestation
            })
            .collect();

        let chain = TrustChain {
            agent_id,
            issuing_authority_id: authority_id.clone(),
            capabilities: attestations,
            constraints,
            status: TrustStatus::Valid,
            expires_at,
            established_at: now,
            revoked_at: None,
            revoked_reason: None,
        };

        self.store.establish(chain, now)
    }

    // ── VERIFY ────────────────────────────────────────────────────────────

    /// Verify that an agent may exercise a capability.
    pub fn verify(
        &self,
        agent_id: &AgentId,
        capability: &str,
        context: &ConstraintContext,
        level: VerificationLevel,
    ) -> Result<VerificationResult> {
        self.verification.verify(agent_id, capability, context, level)
    }

    // ── DELEGATE ──────────────────────────────────────────────────────────

    /// Delegate trust from one agent to another.
    pub fn delegate(&self, request: DelegateRequest) -> Result<DelegationRecord> {
        self.delegation.delegate(request)
    }

    // ── AUDIT ─────────────────────────────────────────────────────────────

    /// Record an audited action for an agent.
    ///
    /// The anchor commits to the agent's current delegation-path state and
    /// is signed by the root authority of the agent's lineage.
    pub fn audit(
        &self,
        agent_id: &AgentId,
        action: &str,
        resource: Option<String>,
        result: AuditResult,
    ) -> Result<AuditAnchor> {
        let trust_chain_hash = self.store.chain_state_hash(agent_id)?;
        let authority_id = self.store.root_authority_of(agent_id)?;
        let signing_key = self.registry.signing_key(&authority_id)?;
        self.ledger
            .record(agent_id, action, resource, result, trust_chain_hash, &signing_key)
    }

    /// Verify the integrity of an agent's audit chain.
    pub fn verify_audit_chain(&self, agent_id: &AgentId) -> ChainVerification {
        self.ledger.verify_agent_chain(agent_id)
    }

    /// Strict integrity check; a break is a security incident.
    pub fn ensure_audit_integrity(&self, agent_id: &AgentId) -> Result<()> {
        crate::audit::ensure_integrity(agent_id, &self.ledger.anchors_for_agent(agent_id))
    }

    // ── REVOKE ────────────────────────────────────────────────────────────

    /// Revoke a node and cascade to all descendants.
    pub fn revoke(&self, target: &RevocationTarget, reason: &str) -> Result<RevocationOutcome> {
        validate_reason(reason)?;
        self.revocation.revoke(target, reason)
    }

    /// Revoke every chain rooted at a human authority or its descendants.
    pub fn revoke_by_human(
        &self,
        human_authority_id: &AuthorityId,
        reason: &str,
    ) -> Result<RevocationOutcome> {
        validate_reason(reason)?;
        self.revocation.revoke_by_human(human_authority_id, reason)
    }

    /// Preview a revocation's blast radius without mutating anything.
    pub fn preview_impact(&self, target: &RevocationTarget) -> Result<ImpactPreview> {
        self.revocation.preview_impact(target)
    }

    // ── Query surface ─────────────────────────────────────────────────────

    pub fn get_chain(&self, agent_id: &AgentId) -> Result<TrustChain> {
        self.store.get_chain(agent_id)
    }

    pub fn list_chains(&self, query: &ChainQuery) -> Vec<TrustChain> {
        self.store.list_chains(query, time::now_micros())
    }

    pub fn resolve_path(&self, agent_id: &AgentId) -> Result<Vec<DelegationRecord>> {
        self.store.resolve_path(agent_id)
    }

    pub fn effective_grant(&self, agent_id: &AgentId) -> Result<EffectiveGrant> {
        self.store.effective_grant(agent_id, time::now_micros())
    }

    pub fn query_audit(&self, query: &AuditQuery) -> Vec<AuditAnchor> {
        query_anchors(&self.ledger.all_anchors(), query)
    }

    /// Anchors whose agent's lineage roots at the given human authority or
    /// one of its descendants.
    pub fn query_audit_by_human_origin(&self, human_id: &AuthorityId) -> Result<Vec<AuditAnchor>> {
        let human = self.registry.get(human_id)?;
        if human.authority_type != AuthorityType::Human {
            return Err(EatpError::Validation {
                field: "human_id".into(),
                message: format!(
                    "authority {human_id} is {}, not human",
                    human.authority_type.as_str()
                ),
            });
        }

        let anchors = self.ledger.all_anchors();
        let mut results = Vec::new();
        for anchor in anchors {
            let Ok(root) = self.store.root_authority_of(&anchor.agent_id) else {
                continue;
            };
            if self.registry.is_descendant_of(&root, human_id) {
                results.push(anchor);
            }
        }
        Ok(results)
    }

    /// Export matching anchors as CSV.
    pub fn export_audit_csv(&self, query: &AuditQuery) -> String {
        export_csv(&self.query_audit(query))
    }

    /// Export matching anchors as JSON.
    pub fn export_audit_json(&self, query: &AuditQuery) -> Result<String> {
        export_json(&self.query_audit(query))
    }

    /// Signed revocation records emitted so far.
    pub fn revocation_records(&self) -> Vec<RevocationRecord> {
        self.revocation.records()
    }

    // ── Snapshot persistence ──────────────────────────────────────────────

    /// Dump the full engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        let (authorities, secret_keys) = self.registry.export_parts();
        let authority_keys = secret_keys
            .into_iter()
            .map(|(id, bytes)| {
                (
                    id,
                    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
                )
            })
            .collect();
        let (chains, archived_chains, delegations) = self.store.export_parts();

        EngineSnapshot {
            authorities,
            authority_keys,
            chains,
            archived_chains,
            delegations,
            revocation_records: self.revocation.records(),
            anchors: self.ledger.export_anchors(),
        }
    }

    /// Rebuild an engine from a snapshot.
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Result<Self> {
        let mut secret_keys = Vec::with_capacity(snapshot.authority_keys.len());
        for (id, encoded) in snapshot.authority_keys {
            let bytes =
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &encoded)
                    .map_err(|e| EatpError::InvalidKey(format!("invalid stored key: {e}")))?;
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| EatpError::InvalidKey("stored key must be 32 bytes".into()))?;
            secret_keys.push((id, bytes));
        }

        let registry = Arc::new(AuthorityRegistry::from_parts(
            snapshot.authorities,
            secret_keys,
        ));
        let store = Arc::new(TrustChainStore::from_parts(
            snapshot.chains,
            snapshot.archived_chains,
            snapshot.delegations,
        ));
        let ledger = Arc::new(AuditLedger::from_anchors(snapshot.anchors));

        Ok(Self::assemble(
            registry,
            store,
            ledger,
            snapshot.revocation_records,
        ))
    }

    // ── Component accessors ───────────────────────────────────────────────

    pub fn registry(&self) -> &AuthorityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TrustChainStore {
        &self.store
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }
}

fn validate_reason(reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(EatpError::Validation {
            field: "reason".into(),
            message: "revocation reason must not be empty".into(),
        });
    }
    Ok(())
}
