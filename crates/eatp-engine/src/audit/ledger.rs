//! The append-only ledger with per-agent append serialization.
//!
//! `parent_anchor_id` linkage defines the hash chain, so appends must be
//! strictly ordered per agent. Each agent id maps to its own append lock
//! (the single-writer-per-scope discipline): appends for one agent
//! serialize while unrelated agents' ledgers append fully in parallel.
//! The head pointer is re-checked under the lock, a compare-and-swap in
//! spirit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use ed25519_dalek::SigningKey;

use crate::error::{EatpError, Result};
use crate::ids::{AgentId, AnchorId};
use crate::time;

use super::anchor::{AuditAnchor, AuditResult};

#[derive(Default)]
struct LedgerInner {
    anchors: HashMap<AnchorId, AuditAnchor>,
    /// Append order per agent, oldest first.
    order: HashMap<AgentId, Vec<AnchorId>>,
    /// Latest anchor per agent.
    heads: HashMap<AgentId, AnchorId>,
}

/// In-memory audit ledger.
pub struct AuditLedger {
    inner: RwLock<LedgerInner>,
    scopes: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner::default()),
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild a ledger from a snapshot of anchors.
    ///
    /// Per-agent order is reconstructed by following `parent_anchor_id`
    /// links from the chain roots.
    pub fn from_anchors(anchors: Vec<AuditAnchor>) -> Self {
        let ledger = Self::new();
        {
            let mut inner = ledger.inner.write().unwrap_or_else(|e| e.into_inner());

            let mut by_parent: HashMap<Option<AnchorId>, Vec<&AuditAnchor>> = HashMap::new();
            for anchor in &anchors {
                by_parent
                    .entry(anchor.parent_anchor_id.clone())
                    .or_default()
                    .push(anchor);
            }

            // Walk each agent's chain from its root (parent = None).
            let roots: Vec<AuditAnchor> = by_parent
                .get(&None)
                .into_iter()
                .flatten()
                .map(|a| (*a).clone())
                .collect();
            for root in roots {
                let agent = root.agent_id.clone();
                let mut cursor = Some(root);
                while let Some(anchor) = cursor {
                    let id = anchor.id.clone();
                    inner.order.entry(agent.clone()).or_default().push(id.clone());
                    inner.heads.insert(agent.clone(), id.clone());
                    cursor = by_parent
                        .get(&Some(id.clone()))
                        .and_then(|children| children.first())
                        .map(|a| (*a).clone());
                    inner.anchors.insert(id, anchor);
                }
            }
        }
        ledger
    }

    /// Append a new anchor for an agent.
    ///
    /// `parent_anchor_id` is set to the agent's current head; the append is
    /// serialized per agent so the chain never forks.
    pub fn record(
        &self,
        agent_id: &AgentId,
        action: &str,
        resource: Option<String>,
        result: AuditResult,
        trust_chain_hash: String,
        signing_key: &SigningKey,
    ) -> Result<AuditAnchor> {
        if action.trim().is_empty() {
            return Err(EatpError::Validation {
                field: "action".into(),
                message: "audited action must not be empty".into(),
            });
        }

        let scope = self.scope_lock(agent_id);
        let _guard = scope.lock().unwrap_or_else(|e| e.into_inner());

        let parent = {
            let inner = self.read();
            inner.heads.get(agent_id).cloned()
        };

        let anchor = AuditAnchor::create(
            agent_id.clone(),
            action,
            resource,
            result,
            time::now_micros(),
            trust_chain_hash,
            parent.clone(),
            signing_key,
        );

        {
            let mut inner = self.write();
            // The scope lock makes a head change impossible here; the check
            // guards against misuse of the internal API, not races.
            if inner.heads.get(agent_id) != parent.as_ref() {
                return Err(EatpError::Storage(format!(
                    "ledger head moved during append for {agent_id}"
                )));
            }
            inner
                .order
                .entry(agent_id.clone())
                .or_default()
                .push(anchor.id.clone());
            inner.heads.insert(agent_id.clone(), anchor.id.clone());
            inner.anchors.insert(anchor.id.clone(), anchor.clone());
        }

        log::info!(
            "recorded audit anchor {} for {agent_id}: {} → {}",
            anchor.id,
            anchor.action,
            anchor.result.as_str()
        );

        Ok(anchor)
    }

    /// The latest anchor id for an agent.
    pub fn head(&self, agent_id: &AgentId) -> Option<AnchorId> {
        self.read().heads.get(agent_id).cloned()
    }

    /// All anchors for an agent, oldest first.
    pub fn anchors_for_agent(&self, agent_id: &AgentId) -> Vec<AuditAnchor> {
        let inner = self.read();
        inner
            .order
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.anchors.get(id))
            .cloned()
            .collect()
    }

    /// Every anchor in the ledger, ordered by timestamp.
    pub fn all_anchors(&self) -> Vec<AuditAnchor> {
        let inner = self.read();
        let mut anchors: Vec<AuditAnchor> = inner.anchors.values().cloned().collect();
        anchors.sort_by_key(|a| a.timestamp);
        anchors
    }

    /// Verify the integrity of one agent's chain.
    pub fn verify_agent_chain(&self, agent_id: &AgentId) -> super::verify::ChainVerification {
        super::verify::verify_chain(&self.anchors_for_agent(agent_id))
    }

    /// Dump all anchors for snapshotting.
    pub fn export_anchors(&self) -> Vec<AuditAnchor> {
        self.all_anchors()
    }

    fn scope_lock(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(scopes.entry(agent_id.clone()).or_default())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
