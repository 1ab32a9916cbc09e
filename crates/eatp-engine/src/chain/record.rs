//! Delegation records — the edges of the trust graph.

use serde::{Deserialize, Serialize};

use crate::capability::Constraint;
use crate::ids::{self, AgentId, DelegationId};

use super::genesis::TrustStatus;

/// One delegation edge: a narrowed re-grant of trust from `delegator_id`
/// to `delegatee_id` for a specific task.
///
/// Edges form a forest rooted at genesis trust chains. `parent_delegation_id`
/// links successive re-delegations along one lineage; `None` means the
/// delegator acts directly under its genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub id: DelegationId,
    pub delegator_id: AgentId,
    pub delegatee_id: AgentId,
    pub task_id: String,
    /// Capability URIs granted to the delegatee. Always a subset of the
    /// delegator's effective capabilities at creation time.
    pub capabilities_delegated: Vec<String>,
    /// Restrictions added by this edge. Only additions are possible; a
    /// child edge can never remove an upstream constraint.
    pub constraint_subset: Vec<Constraint>,
    pub delegated_at: u64,
    /// Clamped to the delegator's effective expiry when both are bounded.
    pub expires_at: Option<u64>,
    pub parent_delegation_id: Option<DelegationId>,
    pub status: TrustStatus,
    pub revoked_at: Option<u64>,
    pub revoked_reason: Option<String>,
}

impl DelegationRecord {
    /// Build a new edge, deriving its id from the content fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        delegator_id: AgentId,
        delegatee_id: AgentId,
        task_id: impl Into<String>,
        capabilities_delegated: Vec<String>,
        constraint_subset: Vec<Constraint>,
        delegated_at: u64,
        expires_at: Option<u64>,
        parent_delegation_id: Option<DelegationId>,
    ) -> Self {
        let task_id = task_id.into();
        let preimage = format!(
            "{}:{}:{}:{}:{}",
            delegator_id,
            delegatee_id,
            task_id,
            capabilities_delegated.join(","),
            delegated_at,
        );
        let id = DelegationId(ids::derive_id("adeleg", preimage.as_bytes()));

        Self {
            id,
            delegator_id,
            delegatee_id,
            task_id,
            capabilities_delegated,
            constraint_subset,
            delegated_at,
            expires_at,
            parent_delegation_id,
            status: TrustStatus::Valid,
            revoked_at: None,
            revoked_reason: None,
        }
    }

    /// Whether this edge can carry trust at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        self.status == TrustStatus::Valid && !self.is_expired(now)
    }

    /// Whether the expiry has passed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expiry) if now > expiry)
    }

    /// Status with lazy expiry applied.
    pub fn effective_status(&self, now: u64) -> TrustStatus {
        if self.status == TrustStatus::Valid && self.is_expired(now) {
            TrustStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(delegated_at: u64) -> DelegationRecord {
        DelegationRecord::new(
            AgentId::from("agent-1"),
            AgentId::from("agent-2"),
            "t1",
            vec!["read_db".into()],
            Vec::new(),
            delegated_at,
            Some(delegated_at + 1_000),
            None,
        )
    }

    #[test]
    fn test_id_derivation_stable() {
        let a = make_record(5_000);
        let b = make_record(5_000);
        assert_eq!(a.id, b.id);
        assert!(a.id.as_str().starts_with("adeleg_"));
    }

    #[test]
    fn test_id_differs_with_timestamp() {
        let a = make_record(5_000);
        let b = make_record(5_001);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_active_and_expiry() {
        let rec = make_record(5_000);
        assert!(rec.is_active(5_500));
        assert!(!rec.is_active(6_001));
        assert_eq!(rec.effective_status(6_001), TrustStatus::Expired);
    }
}
