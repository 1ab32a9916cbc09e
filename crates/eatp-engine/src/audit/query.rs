//! Filtering and sorting over audit anchors.
//!
//! All fields are optional. Unset fields impose no restriction; set fields
//! combine with logical AND.

use crate::ids::AgentId;

use super::anchor::{AuditAnchor, AuditResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditSortOrder {
    /// Most recently recorded anchor first (descending timestamp).
    #[default]
    NewestFirst,
    /// Oldest anchor first (ascending timestamp).
    OldestFirst,
}

/// Query parameters for filtering audit anchors.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Restrict to anchors recorded for this agent.
    pub agent_id: Option<AgentId>,
    /// Restrict to anchors whose action matches exactly.
    pub action: Option<String>,
    /// Restrict to anchors with this result.
    pub result: Option<AuditResult>,
    /// Restrict to anchors whose timestamp falls within `[from, to]`.
    pub time_range: Option<(u64, u64)>,
    /// Maximum number of anchors to return (applied after sorting).
    pub limit: Option<usize>,
    pub sort: AuditSortOrder,
}

/// Execute a query against a slice of anchors.
pub fn query_anchors(anchors: &[AuditAnchor], query: &AuditQuery) -> Vec<AuditAnchor> {
    let mut results: Vec<AuditAnchor> = anchors
        .iter()
        .filter(|anchor| {
            if let Some(agent_id) = &query.agent_id {
                if &anchor.agent_id != agent_id {
                    return false;
                }
            }
            if let Some(action) = &query.action {
                if &anchor.action != action {
                    return false;
                }
            }
            if let Some(result) = query.result {
                if anchor.result != result {
                    return false;
                }
            }
            if let Some((from, to)) = query.time_range {
                if anchor.timestamp < from || anchor.timestamp > to {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    match query.sort {
        AuditSortOrder::NewestFirst => results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        AuditSortOrder::OldestFirst => results.sort_by_key(|a| a.timestamp),
    }

    if let Some(limit) = query.limit {
        results.truncate(limit);
    }
    results
}
