//! Effective grants — folding a delegation path into the capability and
//! constraint set an agent can actually exercise.

use serde::{Deserialize, Serialize};

use crate::chain::{DelegationRecord, TrustChain};
use crate::error::Result;
use crate::ids::{AgentId, AuthorityId, DelegationId};
use crate::time;

use super::attestation::{find_covering, CapabilityAttestation};
use super::constraint::{merge_constraints, Constraint};

/// The capability/constraint set usable by an agent after folding its full
/// delegation path, genesis first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveGrant {
    pub agent_id: AgentId,
    /// Root authority that issued the genesis of this lineage.
    pub root_authority: AuthorityId,
    pub capabilities: Vec<CapabilityAttestation>,
    /// Union of all constraints along the path, in declaration order.
    pub constraints: Vec<Constraint>,
    /// Minimum expiry seen along the path.
    pub expires_at: Option<u64>,
    /// Edge ids from genesis to the agent. Empty for a genesis agent.
    pub path: Vec<DelegationId>,
}

impl EffectiveGrant {
    /// Whether the folded expiry has passed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expiry) if now > expiry)
    }

    /// Whether the grant covers a requested capability URI.
    pub fn covers(&self, requested: &str) -> bool {
        super::attestation::capabilities_cover(&self.capabilities, requested)
    }

    /// Deterministic commitment to the delegation-path state this grant was
    /// computed from. Recorded as `trust_chain_hash` on audit anchors.
    pub fn state_hash(&self) -> String {
        let mut caps: Vec<&str> = self
            .capabilities
            .iter()
            .map(|c| c.capability.as_str())
            .collect();
        caps.sort_unstable();
        let mut constraint_names: Vec<&str> =
            self.constraints.iter().map(|c| c.name.as_str()).collect();
        constraint_names.sort_unstable();
        let path: Vec<&str> = self.path.iter().map(|id| id.as_str()).collect();

        let preimage = format!(
            "{}|{}|{}|{}|{}|{}",
            self.agent_id,
            self.root_authority,
            path.join(","),
            caps.join(","),
            constraint_names.join(","),
            self.expires_at.unwrap_or(0),
        );
        blake3::hash(preimage.as_bytes()).to_hex().to_string()
    }

    /// Terminal edge of the path, if the agent is not a genesis agent.
    pub fn terminal_edge(&self) -> Option<&DelegationId> {
        self.path.last()
    }
}

/// Intersect a parent capability set with a requested subset.
///
/// Every requested URI must be covered by some parent attestation;
/// otherwise the call fails with `CapabilityEscalation` naming the first
/// uncovered capability. The result carries superseding attestations from
/// `attester_id` so each fold step records who re-granted what, and when.
pub fn narrow(
    parent: &[CapabilityAttestation],
    requested: &[String],
    attester_id: &str,
    attested_at: u64,
) -> Result<Vec<CapabilityAttestation>> {
    let mut narrowed = Vec::with_capacity(requested.len());

    for uri in requested {
        let covering = find_covering(parent, uri)?;
        let mut attestation = covering.superseded_by(attester_id, attested_at);
        attestation.capability = uri.clone();
        narrowed.push(attestation);
    }

    Ok(narrowed)
}

/// Fold a delegation path left-to-right from genesis to the terminal agent.
///
/// Applies [`narrow`] and [`merge_constraints`] per edge and takes the
/// minimum expiry seen. The fold is deterministic: it uses only stored
/// record data, so the resulting [`EffectiveGrant::state_hash`] is stable
/// across calls.
pub fn intersect_along_path(
    genesis: &TrustChain,
    path: &[DelegationRecord],
) -> Result<EffectiveGrant> {
    let mut capabilities = genesis.capabilities.clone();
    let mut constraints = genesis.constraints.clone();
    let mut expires_at = genesis.expires_at;
    let mut agent_id = genesis.agent_id.clone();
    let mut edge_ids = Vec::with_capacity(path.len());

    for record in path {
        capabilities = narrow(
            &capabilities,
            &record.capabilities_delegated,
            record.delegator_id.as_str(),
            record.delegated_at,
        )?;
        constraints = merge_constraints(&constraints, &record.constraint_subset)?;
        expires_at = time::min_expiry(expires_at, record.expires_at);
        agent_id = record.delegatee_id.clone();
        edge_ids.push(record.id.clone());
    }

    Ok(EffectiveGrant {
        agent_id,
        root_authority: genesis.issuing_authority_id.clone(),
        capabilities,
        constraints,
        expires_at,
        path: edge_ids,
    })
}
