//! Audit chain integrity verification.
//!
//! Recomputes each anchor's content hash in sequence from the earliest to
//! the latest and checks hashes, parent links, and signatures against the
//! stored values. The first mismatch is reported as `broken_at`; every
//! anchor from that point forward is untrusted.

use crate::error::{EatpError, Result};
use crate::ids::{AgentId, AnchorId};

use super::anchor::AuditAnchor;

/// Result of verifying one hash chain.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub valid: bool,
    /// The first anchor at which the chain breaks, if any.
    pub broken_at: Option<AnchorId>,
}

/// Verify a chain of anchors ordered oldest to newest.
///
/// An empty chain is trivially valid. A break is never auto-corrected.
pub fn verify_chain(anchors: &[AuditAnchor]) -> ChainVerification {
    for (index, anchor) in anchors.iter().enumerate() {
        // Content hash must match the stored value.
        if anchor.recompute_hash() != anchor.anchor_hash {
            return broken(anchor);
        }

        // Parent link must reference the preceding anchor exactly.
        let expected_parent = if index == 0 {
            None
        } else {
            Some(&anchors[index - 1].id)
        };
        if anchor.parent_anchor_id.as_ref() != expected_parent {
            return broken(anchor);
        }

        // Signature must verify over the stored hash.
        if anchor.verify_signature().is_err() {
            return broken(anchor);
        }
    }

    ChainVerification {
        valid: true,
        broken_at: None,
    }
}

/// Strict form: a broken chain is a security incident, raised as
/// [`EatpError::ChainIntegrity`] with the first broken anchor id.
pub fn ensure_integrity(agent_id: &AgentId, anchors: &[AuditAnchor]) -> Result<()> {
    let verification = verify_chain(anchors);
    match verification.broken_at {
        None => Ok(()),
        Some(anchor_id) => Err(EatpError::ChainIntegrity {
            agent_id: agent_id.to_string(),
            broken_at: anchor_id.to_string(),
        }),
    }
}

fn broken(anchor: &AuditAnchor) -> ChainVerification {
    log::warn!("audit chain integrity broken at anchor {}", anchor.id);
    ChainVerification {
        valid: false,
        broken_at: Some(anchor.id.clone()),
    }
}
