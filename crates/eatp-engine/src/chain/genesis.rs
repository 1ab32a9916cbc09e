//! Genesis trust chains — the root grant for an agent.

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityAttestation, Constraint};
use crate::ids::{AgentId, AuthorityId};

/// Lifecycle status of a trust node (genesis or delegation edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    Pending,
    Valid,
    Expired,
    Revoked,
    Invalid,
}

impl TrustStatus {
    /// Stable string form used in exports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
        }
    }
}

/// The root trust grant for an agent, issued directly by an authority.
///
/// One active genesis exists per agent. A genesis is never physically
/// deleted: revocation and supersession are status transitions, and
/// superseded records are archived for audit provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustChain {
    /// The agent this genesis anchors.
    pub agent_id: AgentId,
    /// The authority that issued it.
    pub issuing_authority_id: AuthorityId,
    /// Capabilities granted at the root.
    pub capabilities: Vec<CapabilityAttestation>,
    /// Constraints imposed at the root.
    pub constraints: Vec<Constraint>,
    /// Stored status. Expiry is evaluated lazily against "now" and is not
    /// written back; see [`TrustChain::effective_status`].
    pub status: TrustStatus,
    /// Optional expiry (microseconds since epoch).
    pub expires_at: Option<u64>,
    /// Establishment timestamp (microseconds since epoch).
    pub established_at: u64,
    /// When the chain was revoked, if ever.
    pub revoked_at: Option<u64>,
    /// Why the chain was revoked, if ever.
    pub revoked_reason: Option<String>,
}

impl TrustChain {
    /// Whether this genesis can anchor new trust at `now`: status is
    /// `Valid` and any expiry has not passed.
    pub fn is_active(&self, now: u64) -> bool {
        self.status == TrustStatus::Valid && !self.is_expired(now)
    }

    /// Whether the expiry has passed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expiry) if now > expiry)
    }

    /// Status with lazy expiry applied: a stored `Valid` past its expiry
    /// reports `Expired`.
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
    use crate::capability::CapabilityType;

    fn make_chain(expires_at: Option<u64>) -> TrustChain {
        TrustChain {
            agent_id: AgentId::from("agent-1"),
            issuing_authority_id: AuthorityId::from("aauth_x"),
            capabilities: vec![CapabilityAttestation::new(
                "read_db",
                CapabilityType::Access,
                "aauth_x",
                1_000,
            )],
            constraints: Vec::new(),
            status: TrustStatus::Valid,
            expires_at,
            established_at: 1_000,
            revoked_at: None,
            revoked_reason: None,
        }
    }

    #[test]
    fn test_active_within_expiry() {
        let chain = make_chain(Some(10_000));
        assert!(chain.is_active(5_000));
        assert_eq!(chain.effective_status(5_000), TrustStatus::Valid);
    }

    #[test]
    fn test_lazy_expiry() {
        let chain = make_chain(Some(10_000));
        assert!(!chain.is_active(10_001));
        assert_eq!(chain.effective_status(10_001), TrustStatus::Expired);
        // The stored status is untouched.
        assert_eq!(chain.status, TrustStatus::Valid);
    }

    #[test]
    fn test_unbounded_never_expires() {
        let chain = make_chain(None);
        assert!(chain.is_active(u64::MAX));
    }

    #[test]
    fn test_revoked_is_inactive() {
        let mut chain = make_chain(None);
        chain.status = TrustStatus::Revoked;
        assert!(!chain.is_active(1));
        assert_eq!(chain.effective_status(1), TrustStatus::Revoked);
    }
}
