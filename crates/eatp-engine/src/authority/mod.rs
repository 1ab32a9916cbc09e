//! Authority registry — hierarchical trust-issuing identities.
//!
//! Authorities form a tree via `parent_authority_id`. Each authority owns
//! an Ed25519 key pair held by the registry; the public key is committed
//! to in `certificate_hash`, the signing key signs audit anchors and roots
//! derived revocation keys.

pub mod authority;
pub mod registry;

pub use authority::{Authority, AuthorityType};
pub use registry::{AuthorityFilter, AuthorityRegistry, AuthoritySortBy, SortOrder};
