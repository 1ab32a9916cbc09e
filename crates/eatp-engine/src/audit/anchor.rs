//! Audit anchor type and content hashing.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::signing;
use crate::error::Result;
use crate::ids::{self, AgentId, AnchorId};

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
    Partial,
}

impl AuditResult {
    /// Stable string form used in hashes and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
            Self::Partial => "partial",
        }
    }
}

impl std::str::FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "denied" => Ok(Self::Denied),
            "partial" => Ok(Self::Partial),
            other => Err(format!("unknown audit result: {other}")),
        }
    }
}

/// One immutable, signed, hash-linked record of an audited action.
///
/// Created exactly once per action; never mutated or deleted — tamper
/// detection depends on immutability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAnchor {
    pub id: AnchorId,
    pub agent_id: AgentId,
    pub action: String,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub timestamp: u64,
    /// Commitment to the delegation-path state used to authorize the action.
    pub trust_chain_hash: String,
    /// The previous anchor for this agent, forming the hash chain.
    pub parent_anchor_id: Option<AnchorId>,
    /// Hex SHA-256 over the serialized content fields.
    pub anchor_hash: String,
    /// Public key of the recording authority, base64.
    pub signer_key: String,
    /// Signature over `anchor_hash`, base64.
    pub signature: String,
}

impl AuditAnchor {
    /// Build, hash, and sign a new anchor.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        agent_id: AgentId,
        action: impl Into<String>,
        resource: Option<String>,
        result: AuditResult,
        timestamp: u64,
        trust_chain_hash: String,
        parent_anchor_id: Option<AnchorId>,
        signing_key: &SigningKey,
    ) -> Self {
        let action = action.into();
        let anchor_hash = content_hash(
            &agent_id,
            &action,
            resource.as_deref(),
            result,
            timestamp,
            &trust_chain_hash,
            parent_anchor_id.as_ref(),
        );
        let id = AnchorId(ids::derive_id("aanch", anchor_hash.as_bytes()));

        let signer_key = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            signing_key.verifying_key().to_bytes(),
        );
        let signature = signing::sign_to_base64(signing_key, anchor_hash.as_bytes());

        Self {
            id,
            agent_id,
            action,
            resource,
            result,
            timestamp,
            trust_chain_hash,
            parent_anchor_id,
            anchor_hash,
            signer_key,
            signature,
        }
    }

    /// Recompute the content hash from the anchor's current field values.
    ///
    /// Differs from `anchor_hash` iff a content field was mutated after
    /// creation.
    pub fn recompute_hash(&self) -> String {
        content_hash(
            &self.agent_id,
            &self.action,
            self.resource.as_deref(),
            self.result,
            self.timestamp,
            &self.trust_chain_hash,
            self.parent_anchor_id.as_ref(),
        )
    }

    /// Verify the recording authority's signature over the stored hash.
    pub fn verify_signature(&self) -> Result<()> {
        signing::verify_with_key_base64(
            &self.signer_key,
            self.anchor_hash.as_bytes(),
            &self.signature,
        )
    }
}

/// Hex SHA-256 over the serialized anchor content fields.
fn content_hash(
    agent_id: &AgentId,
    action: &str,
    resource: Option<&str>,
    result: AuditResult,
    timestamp: u64,
    trust_chain_hash: &str,
    parent_anchor_id: Option<&AnchorId>,
) -> String {
    let preimage = format!(
        "{}:{}:{}:{}:{}:{}:{}",
        agent_id,
        action,
        resource.unwrap_or(""),
        result.as_str(),
        timestamp,
        trust_chain_hash,
        parent_anchor_id.map(AnchorId::as_str).unwrap_or(""),
    );
    hex::encode(Sha256::digest(preimage.as_bytes()))
}
