//! Trust chain store — genesis records and the forward delegation graph.
//!
//! The graph is an arena of records keyed by opaque ids with explicit
//! parent-id fields; path resolution is an id-chase, never pointer
//! traversal. Acyclicity holds by construction: edges only point backward
//! in creation time and self-delegation is rejected outright.

pub mod genesis;
pub mod record;
pub mod store;

pub use genesis::{TrustChain, TrustStatus};
pub use record::DelegationRecord;
pub use store::{
    AuthorityCascadeOutcome, CascadeOutcome, ChainQuery, RevocationTarget, TrustChainStore,
};
