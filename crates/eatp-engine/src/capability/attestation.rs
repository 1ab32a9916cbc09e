//! Capability attestations and URI wildcard matching.
//!
//! Capabilities use a URI scheme: `action:resource` with wildcards.
//! Examples:
//!   - `read_db` — a flat capability name
//!   - `read:calendar` — read calendar specifically
//!   - `read:*` — read anything
//!   - `execute:deploy:*` — execute deploy to any environment
//!   - `*` — all capabilities (root trust)
//!
//! An attestation is immutable once issued; a changed grant is expressed by
//! superseding it with a new attestation, never by mutation.

use serde::{Deserialize, Serialize};

use crate::error::{EatpError, Result};

/// Classification of what exercising a capability does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapabilityType {
    /// Read or observe a resource.
    Access,
    /// Perform or mutate something.
    Action,
    /// Re-grant trust to another agent.
    Delegation,
}

impl CapabilityType {
    /// Stable tag used in hashes and exports.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Access => "ACCESS",
            Self::Action => "ACTION",
            Self::Delegation => "DELEGATION",
        }
    }
}

/// A typed capability attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityAttestation {
    /// Capability URI (e.g., `read_db`, `execute:deploy:production`).
    pub capability: String,
    /// What kind of capability this is.
    pub capability_type: CapabilityType,
    /// Names of constraints attached specifically to this capability.
    pub constraints: Vec<String>,
    /// Optional free-form scope data.
    pub scope: Option<serde_json::Value>,
    /// Who attested this capability (authority or delegating agent id).
    pub attester_id: String,
    /// Attestation timestamp (microseconds since epoch).
    pub attested_at: u64,
    /// Optional expiry (microseconds since epoch).
    pub expires_at: Option<u64>,
}

impl CapabilityAttestation {
    /// Create a new attestation with no per-capability constraints or scope.
    pub fn new(
        capability: impl Into<String>,
        capability_type: CapabilityType,
        attester_id: impl Into<String>,
        attested_at: u64,
    ) -> Self {
        Self {
            capability: capability.into(),
            capability_type,
            constraints: Vec::new(),
            scope: None,
            attester_id: attester_id.into(),
            attested_at,
            expires_at: None,
        }
    }

    /// Set an expiry on the attestation.
    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Issue a superseding attestation from a new attester, preserving the
    /// capability itself. The original remains untouched.
    pub fn superseded_by(&self, attester_id: impl Into<String>, attested_at: u64) -> Self {
        Self {
            capability: self.capability.clone(),
            capability_type: self.capability_type,
            constraints: self.constraints.clone(),
            scope: self.scope.clone(),
            attester_id: attester_id.into(),
            attested_at,
            expires_at: self.expires_at,
        }
    }

    /// Check whether this attestation's URI covers a requested URI.
    pub fn covers(&self, requested: &str) -> bool {
        capability_uri_covers(&self.capability, requested)
    }
}

impl PartialEq for CapabilityAttestation {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability
    }
}

impl Eq for CapabilityAttestation {}

/// Check whether a granted URI covers a requested URI.
///
/// Matching rules:
/// - `*` matches everything
/// - `action:resource` matches exactly
/// - `action:*` matches anything under `action:`
/// - `path/*` matches anything under `path/`
pub fn capability_uri_covers(granted: &str, requested: &str) -> bool {
    if granted == "*" {
        return true;
    }

    if granted == requested {
        return true;
    }

    if let Some(prefix) = granted.strip_suffix(":*") {
        if requested == prefix {
            return true;
        }
        if requested.starts_with(prefix) && requested.as_bytes().get(prefix.len()) == Some(&b':') {
            return true;
        }
    }

    if let Some(prefix) = granted.strip_suffix("/*") {
        if requested == prefix {
            return true;
        }
        if requested.starts_with(prefix) && requested.as_bytes().get(prefix.len()) == Some(&b'/') {
            return true;
        }
    }

    false
}

/// Check if a set of attestations covers a single requested capability URI.
pub fn capabilities_cover(granted: &[CapabilityAttestation], requested: &str) -> bool {
    granted.iter().any(|cap| cap.covers(requested))
}

/// Find the attestation covering `requested`, or fail with
/// [`EatpError::CapabilityEscalation`].
pub fn find_covering<'a>(
    granted: &'a [CapabilityAttestation],
    requested: &str,
) -> Result<&'a CapabilityAttestation> {
    granted
        .iter()
        .find(|cap| cap.covers(requested))
        .ok_or_else(|| EatpError::CapabilityEscalation {
            capability: requested.to_string(),
        })
}
