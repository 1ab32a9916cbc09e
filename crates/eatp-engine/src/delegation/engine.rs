//! Creation of delegation edges with capability, constraint, and expiry
//! narrowing.

use std::sync::Arc;

use crate::capability::{merge_constraints, narrow, Constraint};
use crate::chain::{DelegationRecord, TrustChainStore};
use crate::error::{EatpError, Result};
use crate::ids::AgentId;
use crate::time;

/// A request to delegate trust from one agent to another.
#[derive(Debug, Clone)]
pub struct DelegateRequest {
    pub delegator_id: AgentId,
    pub delegatee_id: AgentId,
    pub task_id: String,
    /// Capability URIs to delegate. Must be covered by the delegator's
    /// effective capabilities.
    pub capabilities: Vec<String>,
    /// Restrictions added by this edge.
    pub constraints: Vec<Constraint>,
    /// Requested expiry; clamped to the delegator's effective expiry.
    pub expires_at: Option<u64>,
}

/// Validates and creates delegation edges in the trust chain store.
pub struct DelegationEngine {
    store: Arc<TrustChainStore>,
}

impl DelegationEngine {
    pub fn new(store: Arc<TrustChainStore>) -> Self {
        Self { store }
    }

    /// Delegate trust, enforcing monotonic narrowing end to end.
    ///
    /// Fails with `RevokedUpstream` / `ExpiredUpstream` when the delegator's
    /// own path is no longer valid, `CapabilityEscalation` when a requested
    /// capability exceeds the delegator's effective set, and
    /// `ConstraintConflict` when an added constraint widens an upstream
    /// one. A `ConcurrentModification` error means the delegator's lineage
    /// changed mid-flight; the caller may retry.
    pub fn delegate(&self, request: DelegateRequest) -> Result<DelegationRecord> {
        let now = time::now_micros();

        if request.delegator_id == request.delegatee_id {
            return Err(EatpError::SelfDelegation {
                agent_id: request.delegator_id.to_string(),
            });
        }
        if request.capabilities.is_empty() {
            return Err(EatpError::Validation {
                field: "capabilities".into(),
                message: "at least one capability must be delegated".into(),
            });
        }

        // Observe the lineage version before computing the grant: the write
        // below is rejected if anything changes in between.
        let version = self.store.lineage_version(&request.delegator_id);
        let grant = self.store.effective_grant(&request.delegator_id, now)?;

        // Narrowing is validated against the *effective* sets, so an
        // escalation anywhere up the chain is caught here, not just at the
        // immediate parent.
        narrow(&grant.capabilities, &request.capabilities, request.delegator_id.as_str(), now)?;
        merge_constraints(&grant.constraints, &request.constraints)?;

        let expires_at = time::min_expiry(request.expires_at, grant.expires_at);
        let parent_delegation_id = grant.terminal_edge().cloned();

        let record = DelegationRecord::new(
            request.delegator_id,
            request.delegatee_id,
            request.task_id,
            request.capabilities,
            request.constraints,
            now,
            expires_at,
            parent_delegation_id,
        );

        self.store.insert_delegation(record, version, now)
    }
}
