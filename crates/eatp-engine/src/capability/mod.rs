//! Capability model — typed attestations, narrowing, and the constraint
//! lattice.
//!
//! Everything in this module is pure value manipulation with no I/O:
//! - Capability URIs with wildcard coverage
//! - Typed capability attestations (ACCESS / ACTION / DELEGATION)
//! - Structured constraints forming a narrowing-only lattice
//! - Effective-grant computation by folding a delegation path

pub mod attestation;
pub mod constraint;
pub mod grant;

pub use attestation::{
    capabilities_cover, capability_uri_covers, CapabilityAttestation, CapabilityType,
};
pub use constraint::{merge_constraints, Constraint, ConstraintContext, ConstraintKind};
pub use grant::{intersect_along_path, narrow, EffectiveGrant};
