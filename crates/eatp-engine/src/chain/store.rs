//! The trust chain store — arena of genesis records and delegation edges.
//!
//! All graph state lives behind one `RwLock`: reads (path resolution,
//! verification, previews) share the lock, while writes (establish,
//! delegate, cascade revocation) serialize. A cascade therefore always sees
//! a consistent snapshot — an edge created concurrently is either fully
//! included in the traversal or fully excluded, never partially.
//!
//! Optimistic concurrency: every delegator lineage carries a version that
//! is bumped on each outgoing edge write and on revocation. A writer that
//! computed its effective grant against a stale version is rejected with
//! `ConcurrentModification` and must retry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::capability::{intersect_along_path, EffectiveGrant};
use crate::error::{EatpError, Result};
use crate::ids::{AgentId, AuthorityId, DelegationId};

use super::genesis::{TrustChain, TrustStatus};
use super::record::DelegationRecord;

/// What a revocation call targets: an agent's genesis chain, or a single
/// delegation edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevocationTarget {
    Agent(AgentId),
    Delegation(DelegationId),
}

impl RevocationTarget {
    /// The node identifier used in revocation records and error contexts.
    pub fn node_id(&self) -> &str {
        match self {
            Self::Agent(id) => id.as_str(),
            Self::Delegation(id) => id.as_str(),
        }
    }
}

/// Result of a cascade revocation.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    /// Every agent whose trust is invalidated by the cascade, in BFS order.
    pub revoked_agent_ids: Vec<AgentId>,
    /// Root authority of the revoked lineage, when resolvable.
    pub root_authority: Option<AuthorityId>,
    /// False when the target was already revoked (idempotent no-op).
    pub newly_revoked: bool,
}

/// Outcome of revoking all genesis chains under a set of authorities.
#[derive(Debug, Clone)]
pub struct AuthorityCascadeOutcome {
    /// Union of affected agents across all cascaded chains, in order.
    pub revoked_agent_ids: Vec<AgentId>,
    /// Genesis agents newly revoked by this call, with their issuers.
    pub revoked_genesis: Vec<(AgentId, AuthorityId)>,
}

/// Filter for listing trust chains.
#[derive(Debug, Clone, Default)]
pub struct ChainQuery {
    /// Restrict to chains issued by this authority.
    pub authority_id: Option<AuthorityId>,
    /// Restrict to chains whose lazy-evaluated status matches.
    pub status: Option<TrustStatus>,
    /// Case-insensitive substring match on the agent id.
    pub agent_search: Option<String>,
    /// Include archived (superseded) genesis records.
    pub include_archived: bool,
}

#[derive(Default)]
struct GraphInner {
    /// Current genesis per agent.
    chains: HashMap<AgentId, TrustChain>,
    /// Superseded genesis records, kept for audit provenance.
    archived_chains: Vec<TrustChain>,
    /// All delegation edges ever created.
    records: HashMap<DelegationId, DelegationRecord>,
    /// Latest incoming edge per agent (its active lineage).
    incoming: HashMap<AgentId, DelegationId>,
    /// Outgoing edges per delegator.
    outgoing: HashMap<AgentId, Vec<DelegationId>>,
    /// Per-delegator lineage versions for optimistic concurrency.
    lineage_versions: HashMap<AgentId, u64>,
    /// Cached effective grants; invalidated on edge writes and revocation.
    grant_cache: HashMap<AgentId, EffectiveGrant>,
    /// Bumped on every graph mutation. A grant computed under a read lock
    /// is only cached if the graph has not moved since.
    version: u64,
}

/// In-memory trust graph store.
pub struct TrustChainStore {
    inner: RwLock<GraphInner>,
}

impl Default for TrustChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustChainStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Rebuild a store from snapshot parts. Secondary indexes and lineage
    /// versions are reconstructed from the records themselves.
    pub fn from_parts(
        chains: Vec<TrustChain>,
        archived_chains: Vec<TrustChain>,
        records: Vec<DelegationRecord>,
    ) -> Self {
        let mut inner = GraphInner {
            archived_chains,
            ..GraphInner::default()
        };

        for chain in chains {
            inner.chains.insert(chain.agent_id.clone(), chain);
        }

        let mut sorted = records;
        sorted.sort_by_key(|r| r.delegated_at);
        for record in sorted {
            inner
                .outgoing
                .entry(record.delegator_id.clone())
                .or_default()
                .push(record.id.clone());
            inner
                .incoming
                .insert(record.delegatee_id.clone(), record.id.clone());
            inner.records.insert(record.id.clone(), record);
        }

        for (delegator, edges) in &inner.outgoing {
            inner
                .lineage_versions
                .insert(delegator.clone(), edges.len() as u64);
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    // ── Establishment ─────────────────────────────────────────────────────

    /// Install a genesis trust chain for an agent.
    ///
    /// Fails with `DuplicateGenesis` if an active genesis already exists,
    /// and with `Validation` if the agent currently sits inside someone
    /// else's lineage (one active trust path per agent). A revoked or
    /// expired predecessor is archived, never overwritten in place.
    pub fn establish(&self, chain: TrustChain, now: u64) -> Result<TrustChain> {
        let mut inner = self.write();

        if let Some(existing) = inner.chains.get(&chain.agent_id) {
            if existing.is_active(now) {
                return Err(EatpError::DuplicateGenesis {
                    agent_id: chain.agent_id.to_string(),
                });
            }
        }

        if let Some(edge_id) = inner.incoming.get(&chain.agent_id) {
            if let Some(edge) = inner.records.get(edge_id) {
                if edge.is_active(now) {
                    return Err(EatpError::Validation {
                        field: "agent_id".into(),
                        message: format!(
                            "agent {} already holds an active delegated trust path",
                            chain.agent_id
                        ),
                    });
                }
            }
        }

        if let Some(previous) = inner.chains.remove(&chain.agent_id) {
            inner.archived_chains.push(previous);
        }

        log::info!(
            "established genesis for agent {} under authority {}",
            chain.agent_id,
            chain.issuing_authority_id
        );

        invalidate_cache_from(&mut inner, &chain.agent_id);
        inner.version += 1;
        inner.chains.insert(chain.agent_id.clone(), chain.clone());
        Ok(chain)
    }

    // ── Lineage versions ──────────────────────────────────────────────────

    /// Current lineage version for a delegator (0 if it never delegated).
    pub fn lineage_version(&self, agent_id: &AgentId) -> u64 {
        self.read()
            .lineage_versions
            .get(agent_id)
            .copied()
            .unwrap_or(0)
    }

    // ── Delegation edges ──────────────────────────────────────────────────

    /// Persist a delegation edge under optimistic concurrency.
    ///
    /// `expected_version` is the delegator's lineage version observed when
    /// the caller computed the effective grant; a stale value is rejected
    /// with `ConcurrentModification`.
    pub fn insert_delegation(
        &self,
        record: DelegationRecord,
        expected_version: u64,
        now: u64,
    ) -> Result<DelegationRecord> {
        let mut inner = self.write();

        let actual = inner
            .lineage_versions
            .get(&record.delegator_id)
            .copied()
            .unwrap_or(0);
        if actual != expected_version {
            return Err(EatpError::ConcurrentModification {
                agent_id: record.delegator_id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        if let Some(chain) = inner.chains.get(&record.delegatee_id) {
            if chain.is_active(now) {
                return Err(EatpError::Validation {
                    field: "delegatee_id".into(),
                    message: format!(
                        "agent {} is already anchored by a genesis trust chain",
                        record.delegatee_id
                    ),
                });
            }
        }
        if let Some(edge_id) = inner.incoming.get(&record.delegatee_id) {
            if let Some(edge) = inner.records.get(edge_id) {
                if edge.is_active(now) {
                    return Err(EatpError::Validation {
                        field: "delegatee_id".into(),
                        message: format!(
                            "agent {} already holds an active delegated trust path",
                            record.delegatee_id
                        ),
                    });
                }
            }
        }

        inner
            .outgoing
            .entry(record.delegator_id.clone())
            .or_default()
            .push(record.id.clone());
        inner
            .incoming
            .insert(record.delegatee_id.clone(), record.id.clone());
        *inner
            .lineage_versions
            .entry(record.delegator_id.clone())
            .or_insert(0) += 1;

        // Narrowing is path-dependent: the delegatee and everything below
        // it must be recomputed, not patched.
        invalidate_cache_from(&mut inner, &record.delegatee_id);
        inner.version += 1;

        log::info!(
            "delegated {:?} from {} to {} (task {})",
            record.capabilities_delegated,
            record.delegator_id,
            record.delegatee_id,
            record.task_id
        );

        inner.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    // ── Path resolution and effective grants ──────────────────────────────

    /// Ordered edge list from genesis to `agent_id`. Empty for a genesis
    /// agent; `NotFound` for an agent with no trust path at all. O(depth).
    pub fn resolve_path(&self, agent_id: &AgentId) -> Result<Vec<DelegationRecord>> {
        let inner = self.read();
        resolve_path_inner(&inner, agent_id)
    }

    /// Effective grant for an agent, folded from genesis to the terminal
    /// edge and cached.
    ///
    /// Short-circuits with `RevokedUpstream` / `ExpiredUpstream` if any node
    /// on the path is revoked or past its expiry as of `now`. Expiry is
    /// evaluated lazily; nothing is written back.
    pub fn effective_grant(&self, agent_id: &AgentId, now: u64) -> Result<EffectiveGrant> {
        let (grant, observed_version) = {
            let inner = self.read();
            if let Some(grant) = inner.grant_cache.get(agent_id) {
                // An expired cached grant falls through to the full walk so
                // the error names the node that actually expired.
                if !grant.is_expired(now) {
                    return Ok(grant.clone());
                }
            }
            (compute_grant(&inner, agent_id, now)?, inner.version)
        };

        let mut inner = self.write();
        // Cache only if the graph has not moved since the computation: a
        // concurrent revocation or edge write must not be shadowed by a
        // stale entry.
        if inner.version == observed_version {
            inner.grant_cache.insert(agent_id.clone(), grant.clone());
        }
        Ok(grant)
    }

    /// Root issuing authority of the lineage `agent_id` sits in.
    pub fn root_authority_of(&self, agent_id: &AgentId) -> Result<AuthorityId> {
        let inner = self.read();
        let root_agent = resolve_root_agent(&inner, agent_id)?;
        inner
            .chains
            .get(&root_agent)
            .map(|chain| chain.issuing_authority_id.clone())
            .ok_or_else(|| EatpError::NotFound(format!("no genesis trust chain for {root_agent}")))
    }

    /// Deterministic commitment to the delegation-path state of an agent,
    /// valid or not. Used as `trust_chain_hash` on audit anchors.
    pub fn chain_state_hash(&self, agent_id: &AgentId) -> Result<String> {
        let inner = self.read();
        let path = resolve_path_inner(&inner, agent_id)?;
        let root_agent = path
            .first()
            .map(|record| record.delegator_id.clone())
            .unwrap_or_else(|| agent_id.clone());
        let genesis = inner
            .chains
            .get(&root_agent)
            .ok_or_else(|| EatpError::NotFound(format!("no genesis trust chain for {root_agent}")))?;

        let mut preimage = format!(
            "{}|{}|{}|{}",
            genesis.agent_id,
            genesis.issuing_authority_id,
            genesis.established_at,
            genesis.status.as_str(),
        );
        for record in &path {
            preimage.push('|');
            preimage.push_str(record.id.as_str());
            preimage.push(':');
            preimage.push_str(record.status.as_str());
        }
        Ok(blake3::hash(preimage.as_bytes()).to_hex().to_string())
    }

    // ── Revocation ────────────────────────────────────────────────────────

    /// Revoke a node and cascade to every graph descendant, atomically.
    ///
    /// Idempotent: revoking an already-revoked node changes nothing and
    /// returns the same reachable set. Revocation is monotonic — there is
    /// no path back to `Valid`.
    pub fn cascade_revoke(
        &self,
        target: &RevocationTarget,
        reason: &str,
        now: u64,
    ) -> Result<CascadeOutcome> {
        let mut inner = self.write();

        let (start_agent, newly_revoked, root_authority) = match target {
            RevocationTarget::Agent(agent_id) => {
                let chain = inner.chains.get_mut(agent_id).ok_or_else(|| {
                    EatpError::NotFound(format!("no genesis trust chain for {agent_id}"))
                })?;
                let authority = chain.issuing_authority_id.clone();
                let newly = chain.status != TrustStatus::Revoked;
                if newly {
                    chain.status = TrustStatus::Revoked;
                    chain.revoked_at = Some(now);
                    chain.revoked_reason = Some(reason.to_string());
                }
                (agent_id.clone(), newly, Some(authority))
            }
            RevocationTarget::Delegation(delegation_id) => {
                let record = inner.records.get_mut(delegation_id).ok_or_else(|| {
                    EatpError::NotFound(format!("no delegation record {delegation_id}"))
                })?;
                let delegatee = record.delegatee_id.clone();
                let newly = record.status != TrustStatus::Revoked;
                if newly {
                    record.status = TrustStatus::Revoked;
                    record.revoked_at = Some(now);
                    record.revoked_reason = Some(reason.to_string());
                }
                let root = resolve_root_agent(&inner, &delegatee)
                    .ok()
                    .and_then(|root_agent| {
                        inner
                            .chains
                            .get(&root_agent)
                            .map(|c| c.issuing_authority_id.clone())
                    });
                (delegatee, newly, root)
            }
        };

        let revoked_agent_ids = mark_descendants_revoked(&mut inner, &start_agent, reason, now);

        inner.version += 1;
        for agent in &revoked_agent_ids {
            inner.grant_cache.remove(agent);
            *inner.lineage_versions.entry(agent.clone()).or_insert(0) += 1;
        }

        if newly_revoked {
            log::warn!(
                "revoked {} ({}): cascade invalidated {} agent(s)",
                target.node_id(),
                reason,
                revoked_agent_ids.len()
            );
        }

        Ok(CascadeOutcome {
            revoked_agent_ids,
            root_authority,
            newly_revoked,
        })
    }

    /// Revoke every current genesis chain issued by any of `authority_ids`,
    /// cascading each, under a single consistent write guard.
    pub fn revoke_by_authorities(
        &self,
        authority_ids: &HashSet<AuthorityId>,
        reason: &str,
        now: u64,
    ) -> Result<AuthorityCascadeOutcome> {
        let mut inner = self.write();

        let targets: Vec<(AgentId, AuthorityId)> = inner
            .chains
            .values()
            .filter(|chain| authority_ids.contains(&chain.issuing_authority_id))
            .map(|chain| (chain.agent_id.clone(), chain.issuing_authority_id.clone()))
            .collect();

        let mut all_affected: Vec<AgentId> = Vec::new();
        let mut seen: HashSet<AgentId> = HashSet::new();
        let mut revoked_genesis = Vec::new();
        inner.version += 1;

        for (agent_id, authority_id) in targets {
            if let Some(chain) = inner.chains.get_mut(&agent_id) {
                if chain.status != TrustStatus::Revoked {
                    chain.status = TrustStatus::Revoked;
                    chain.revoked_at = Some(now);
                    chain.revoked_reason = Some(reason.to_string());
                    revoked_genesis.push((agent_id.clone(), authority_id));
                }
            }

            for affected in mark_descendants_revoked(&mut inner, &agent_id, reason, now) {
                inner.grant_cache.remove(&affected);
                *inner.lineage_versions.entry(affected.clone()).or_insert(0) += 1;
                if seen.insert(affected.clone()) {
                    all_affected.push(affected);
                }
            }
        }

        if !revoked_genesis.is_empty() {
            log::warn!(
                "authority revocation ({reason}): {} genesis chain(s), {} agent(s) affected",
                revoked_genesis.len(),
                all_affected.len()
            );
        }

        Ok(AuthorityCascadeOutcome {
            revoked_agent_ids: all_affected,
            revoked_genesis,
        })
    }

    /// The agents a revocation of `target` would affect, without mutating.
    pub fn preview_impact(&self, target: &RevocationTarget) -> Result<Vec<AgentId>> {
        let inner = self.read();

        let start_agent = match target {
            RevocationTarget::Agent(agent_id) => {
                if !inner.chains.contains_key(agent_id) {
                    return Err(EatpError::NotFound(format!(
                        "no genesis trust chain for {agent_id}"
                    )));
                }
                agent_id.clone()
            }
            RevocationTarget::Delegation(delegation_id) => inner
                .records
                .get(delegation_id)
                .map(|record| record.delegatee_id.clone())
                .ok_or_else(|| {
                    EatpError::NotFound(format!("no delegation record {delegation_id}"))
                })?,
        };

        Ok(reachable_agents(&inner, &start_agent))
    }

    // ── Queries and snapshot export ───────────────────────────────────────

    /// Current genesis chain for an agent.
    pub fn get_chain(&self, agent_id: &AgentId) -> Result<TrustChain> {
        self.read()
            .chains
            .get(agent_id)
            .cloned()
            .ok_or_else(|| EatpError::NotFound(format!("no genesis trust chain for {agent_id}")))
    }

    /// A delegation record by id.
    pub fn get_record(&self, id: &DelegationId) -> Result<DelegationRecord> {
        self.read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| EatpError::NotFound(format!("no delegation record {id}")))
    }

    /// List genesis chains matching a filter, most recent first.
    pub fn list_chains(&self, query: &ChainQuery, now: u64) -> Vec<TrustChain> {
        let inner = self.read();

        let mut results: Vec<TrustChain> = inner
            .chains
            .values()
            .chain(
                query
                    .include_archived
                    .then_some(inner.archived_chains.iter())
                    .into_iter()
                    .flatten(),
            )
            .filter(|chain| {
                if let Some(authority_id) = &query.authority_id {
                    if &chain.issuing_authority_id != authority_id {
                        return false;
                    }
                }
                if let Some(status) = query.status {
                    if chain.effective_status(now) != status {
                        return false;
                    }
                }
                if let Some(search) = &query.agent_search {
                    if !chain
                        .agent_id
                        .as_str()
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

        results.sort_by(|a, b| b.established_at.cmp(&a.established_at));
        results
    }

    /// List delegation records, optionally restricted to one delegator.
    pub fn list_delegations(&self, delegator: Option<&AgentId>) -> Vec<DelegationRecord> {
        let inner = self.read();
        let mut results: Vec<DelegationRecord> = match delegator {
            Some(agent_id) => inner
                .outgoing
                .get(agent_id)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.records.get(id))
                .cloned()
                .collect(),
            None => inner.records.values().cloned().collect(),
        };
        results.sort_by_key(|record| record.delegated_at);
        results
    }

    /// Dump the graph for snapshotting: (current chains, archived chains,
    /// all delegation records).
    pub fn export_parts(&self) -> (Vec<TrustChain>, Vec<TrustChain>, Vec<DelegationRecord>) {
        let inner = self.read();
        (
            inner.chains.values().cloned().collect(),
            inner.archived_chains.clone(),
            inner.records.values().cloned().collect(),
        )
    }

    // ── Lock helpers ──────────────────────────────────────────────────────

    fn read(&self) -> std::sync::RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Internal graph algorithms ─────────────────────────────────────────────

/// Chase `parent_delegation_id` links from the agent's incoming edge back
/// to genesis and return the path in genesis→agent order.
fn resolve_path_inner(inner: &GraphInner, agent_id: &AgentId) -> Result<Vec<DelegationRecord>> {
    let Some(edge_id) = inner.incoming.get(agent_id) else {
        return if inner.chains.contains_key(agent_id) {
            Ok(Vec::new())
        } else {
            Err(EatpError::NotFound(format!(
                "no genesis trust chain for {agent_id}"
            )))
        };
    };

    let mut path = Vec::new();
    let mut cursor = Some(edge_id.clone());
    while let Some(id) = cursor {
        let record = inner
            .records
            .get(&id)
            .ok_or_else(|| EatpError::Storage(format!("dangling delegation reference {id}")))?;
        cursor = record.parent_delegation_id.clone();
        path.push(record.clone());
    }

    path.reverse();
    Ok(path)
}

/// The genesis agent anchoring `agent_id`'s lineage.
fn resolve_root_agent(inner: &GraphInner, agent_id: &AgentId) -> Result<AgentId> {
    let path = resolve_path_inner(inner, agent_id)?;
    Ok(path
        .first()
        .map(|record| record.delegator_id.clone())
        .unwrap_or_else(|| agent_id.clone()))
}

/// Full grant computation with upstream status short-circuiting.
fn compute_grant(inner: &GraphInner, agent_id: &AgentId, now: u64) -> Result<EffectiveGrant> {
    let path = resolve_path_inner(inner, agent_id)?;
    let root_agent = path
        .first()
        .map(|record| record.delegator_id.clone())
        .unwrap_or_else(|| agent_id.clone());

    let genesis = inner
        .chains
        .get(&root_agent)
        .ok_or_else(|| EatpError::NotFound(format!("no genesis trust chain for {root_agent}")))?;

    if genesis.status == TrustStatus::Revoked {
        return Err(EatpError::RevokedUpstream {
            node_id: root_agent.to_string(),
        });
    }
    if genesis.is_expired(now) {
        return Err(EatpError::ExpiredUpstream {
            node_id: root_agent.to_string(),
        });
    }

    for record in &path {
        if record.status == TrustStatus::Revoked {
            return Err(EatpError::RevokedUpstream {
                node_id: record.id.to_string(),
            });
        }
        if record.is_expired(now) {
            return Err(EatpError::ExpiredUpstream {
                node_id: record.id.to_string(),
            });
        }
    }

    intersect_along_path(genesis, &path)
}

/// BFS from `start_agent`, marking every reachable delegation edge revoked.
/// Returns the affected agents in traversal order, starting with
/// `start_agent` itself.
fn mark_descendants_revoked(
    inner: &mut GraphInner,
    start_agent: &AgentId,
    reason: &str,
    now: u64,
) -> Vec<AgentId> {
    let mut order = vec![start_agent.clone()];
    let mut seen: HashSet<AgentId> = order.iter().cloned().collect();
    let mut queue: VecDeque<AgentId> = order.iter().cloned().collect();

    while let Some(agent) = queue.pop_front() {
        let edge_ids = inner.outgoing.get(&agent).cloned().unwrap_or_default();
        for edge_id in edge_ids {
            let Some(record) = inner.records.get_mut(&edge_id) else {
                continue;
            };
            if record.status != TrustStatus::Revoked {
                record.status = TrustStatus::Revoked;
                record.revoked_at = Some(now);
                record.revoked_reason = Some(reason.to_string());
            }
            let delegatee = record.delegatee_id.clone();
            if seen.insert(delegatee.clone()) {
                order.push(delegatee.clone());
                queue.push_back(delegatee);
            }
        }
    }

    order
}

/// BFS collecting reachable agents without mutating anything.
fn reachable_agents(inner: &GraphInner, start_agent: &AgentId) -> Vec<AgentId> {
    let mut order = vec![start_agent.clone()];
    let mut seen: HashSet<AgentId> = order.iter().cloned().collect();
    let mut queue: VecDeque<AgentId> = order.iter().cloned().collect();

    while let Some(agent) = queue.pop_front() {
        for edge_id in inner.outgoing.get(&agent).into_iter().flatten() {
            let Some(record) = inner.records.get(edge_id) else {
                continue;
            };
            if seen.insert(record.delegatee_id.clone()) {
                order.push(record.delegatee_id.clone());
                queue.push_back(record.delegatee_id.clone());
            }
        }
    }

    order
}

/// Drop cached grants for an agent and everything delegated below it.
fn invalidate_cache_from(inner: &mut GraphInner, agent_id: &AgentId) {
    for agent in reachable_agents(inner, agent_id) {
        inner.grant_cache.remove(&agent);
    }
}
