//! Identifier newtypes for graph nodes and ledger anchors.
//!
//! Derived identifiers use `prefix_` + base58 of the first 16 bytes of a
//! SHA-256 over the record's content hash, so IDs are stable, opaque, and
//! collision-resistant. `AgentId` is the exception: agents are named by the
//! calling layer and the engine treats the value as opaque.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derive an identifier string from a prefix and arbitrary input bytes.
pub(crate) fn derive_id(prefix: &str, input: &[u8]) -> String {
    let hash = Sha256::digest(input);
    let encoded = bs58::encode(&hash[..16]).into_string();
    format!("{prefix}_{encoded}")
}

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// View the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_newtype! {
    /// Caller-supplied opaque identifier for an agent.
    AgentId
}

id_newtype! {
    /// Identifier for a trust-issuing authority. Format: `aauth_` + base58.
    AuthorityId
}

id_newtype! {
    /// Identifier for a delegation edge. Format: `adeleg_` + base58.
    DelegationId
}

id_newtype! {
    /// Identifier for an audit anchor. Format: `aanch_` + base58.
    AnchorId
}
