//! Signed revocation records.
//!
//! Each successful `revoke()` emits one record for the target node, signed
//! with a revocation key derived from the root authority's key. The cascade
//! itself is a pure status transition on the graph; the record is the
//! portable, verifiable statement that it happened.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto::signing;
use crate::error::Result;
use crate::ids::AuthorityId;

/// A signed statement that a graph node was revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// The revoked node: an agent id (genesis) or a delegation id.
    pub node_id: String,
    /// Root authority of the revoked lineage.
    pub authority_id: AuthorityId,
    pub reason: String,
    pub revoked_at: u64,
    /// Public half of the derived revocation key, base64.
    pub revoker_key: String,
    /// Signature over `revoke:{node_id}:{authority_id}:{revoked_at}:{reason}`.
    pub signature: String,
}

impl RevocationRecord {
    /// Create and sign a revocation record with a derived revocation key.
    pub fn create(
        node_id: impl Into<String>,
        authority_id: AuthorityId,
        reason: impl Into<String>,
        revoked_at: u64,
        revocation_key: &SigningKey,
    ) -> Self {
        let node_id = node_id.into();
        let reason = reason.into();

        let revoker_key = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            revocation_key.verifying_key().to_bytes(),
        );
        let to_sign = preimage(&node_id, &authority_id, revoked_at, &reason);
        let signature = signing::sign_to_base64(revocation_key, to_sign.as_bytes());

        Self {
            node_id,
            authority_id,
            reason,
            revoked_at,
            revoker_key,
            signature,
        }
    }

    /// Verify the record's signature against its embedded public key.
    pub fn verify_signature(&self) -> Result<()> {
        let to_verify = preimage(&self.node_id, &self.authority_id, self.revoked_at, &self.reason);
        signing::verify_with_key_base64(&self.revoker_key, to_verify.as_bytes(), &self.signature)
    }
}

fn preimage(node_id: &str, authority_id: &AuthorityId, revoked_at: u64, reason: &str) -> String {
    format!("revoke:{node_id}:{authority_id}:{revoked_at}:{reason}")
}
