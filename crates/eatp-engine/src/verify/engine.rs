//! Path-walking authorization checks.
//!
//! Verification is read-only: it resolves the agent's path, folds the
//! effective grant, and evaluates status, capability coverage, and
//! constraints. Domain invalidity is reported in the result, not as an
//! error — only missing agents and infrastructure faults surface as `Err`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::ConstraintContext;
use crate::chain::TrustChainStore;
use crate::error::{EatpError, Result};
use crate::ids::{AgentId, DelegationId};
use crate::time;

/// How deep a verification goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    /// Status-only: is the path valid end to end right now?
    Shallow,
    /// Status, capability coverage, and full constraint evaluation.
    #[default]
    Standard,
}

/// Outcome of a verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub agent_id: AgentId,
    pub valid: bool,
    /// Why verification failed: an upstream status error name, the failing
    /// constraint's identifier, or `capability_not_granted`.
    pub reason: Option<String>,
    pub level: VerificationLevel,
    /// Edge ids of the path that was checked (empty when unresolvable).
    pub path: Vec<DelegationId>,
    pub verified_at: u64,
}

/// Reason string for a capability absent from the effective grant, distinct
/// from the upstream status reasons so callers can tell "never had it"
/// from "lost it".
pub const REASON_CAPABILITY_NOT_GRANTED: &str = "capability_not_granted";

/// Reason string when an ancestor on the path has been revoked.
pub const REASON_REVOKED_UPSTREAM: &str = "RevokedUpstreamError";

/// Reason string when an ancestor on the path has expired.
pub const REASON_EXPIRED_UPSTREAM: &str = "ExpiredUpstreamError";

/// Walks resolved chain paths to authorize requested actions.
pub struct VerificationEngine {
    store: Arc<TrustChainStore>,
}

impl VerificationEngine {
    pub fn new(store: Arc<TrustChainStore>) -> Self {
        Self { store }
    }

    /// Verify that `agent_id` may exercise `capability` under `context`.
    ///
    /// Constraints are evaluated in declaration order, short-circuiting on
    /// the first failure with that constraint's name as the reason.
    pub fn verify(
        &self,
        agent_id: &AgentId,
        capability: &str,
        context: &ConstraintContext,
        level: VerificationLevel,
    ) -> Result<VerificationResult> {
        let now = context.at.unwrap_or_else(time::now_micros);

        let grant = match self.store.effective_grant(agent_id, now) {
            Ok(grant) => grant,
            Err(EatpError::RevokedUpstream { .. }) => {
                return Ok(invalid(agent_id, REASON_REVOKED_UPSTREAM, level, now));
            }
            Err(EatpError::ExpiredUpstream { .. }) => {
                return Ok(invalid(agent_id, REASON_EXPIRED_UPSTREAM, level, now));
            }
            Err(err) => return Err(err),
        };

        if level == VerificationLevel::Shallow {
            return Ok(VerificationResult {
                agent_id: agent_id.clone(),
                valid: true,
                reason: None,
                level,
                path: grant.path,
                verified_at: now,
            });
        }

        if !grant.covers(capability) {
            return Ok(VerificationResult {
                agent_id: agent_id.clone(),
                valid: false,
                reason: Some(REASON_CAPABILITY_NOT_GRANTED.to_string()),
                level,
                path: grant.path,
                verified_at: now,
            });
        }

        for constraint in &grant.constraints {
            if !constraint.is_satisfied(context) {
                return Ok(VerificationResult {
                    agent_id: agent_id.clone(),
                    valid: false,
                    reason: Some(constraint.name.clone()),
                    level,
                    path: grant.path,
                    verified_at: now,
                });
            }
        }

        Ok(VerificationResult {
            agent_id: agent_id.clone(),
            valid: true,
            reason: None,
            level,
            path: grant.path,
            verified_at: now,
        })
    }
}

fn invalid(
    agent_id: &AgentId,
    reason: &str,
    level: VerificationLevel,
    now: u64,
) -> VerificationResult {
    VerificationResult {
        agent_id: agent_id.clone(),
        valid: false,
        reason: Some(reason.to_string()),
        level,
        path: Vec::new(),
        verified_at: now,
    }
}
