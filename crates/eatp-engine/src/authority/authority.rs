//! Authority record type.

use serde::{Deserialize, Serialize};

use crate::ids::AuthorityId;

/// What kind of entity an authority is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityType {
    Organization,
    System,
    Human,
}

impl AuthorityType {
    /// Stable string form used in filters and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::System => "system",
            Self::Human => "human",
        }
    }
}

impl std::str::FromStr for AuthorityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "organization" => Ok(Self::Organization),
            "system" => Ok(Self::System),
            "human" => Ok(Self::Human),
            other => Err(format!("unknown authority type: {other}")),
        }
    }
}

/// A trust-issuing identity.
///
/// Never hard-deleted: deactivation is a status flip with a mandatory
/// reason, preserving audit provenance for everything the authority issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authority {
    pub id: AuthorityId,
    pub name: String,
    pub authority_type: AuthorityType,
    pub parent_authority_id: Option<AuthorityId>,
    pub is_active: bool,
    /// Hex SHA-256 of the authority's Ed25519 public key.
    pub certificate_hash: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub deactivation_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_type_roundtrip() {
        for ty in [
            AuthorityType::Organization,
            AuthorityType::System,
            AuthorityType::Human,
        ] {
            let parsed: AuthorityType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("committee".parse::<AuthorityType>().is_err());
    }
}
