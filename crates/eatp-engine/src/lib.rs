//! EATP — Enterprise Agent Trust Protocol engine.
//!
//! Establishes, delegates, verifies, audits, and revokes
//! cryptographically-scoped trust for autonomous agents: a directed
//! delegation graph with monotonic capability narrowing, cascade
//! revocation, and a tamper-evident, hash-linked audit ledger.

pub mod audit;
pub mod authority;
pub mod capability;
pub mod chain;
pub mod crypto;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod ids;
pub mod revocation;
pub mod storage;
pub mod time;
pub mod verify;

// Re-export primary types
pub use engine::{EatpEngine, EngineSnapshot};
pub use error::{EatpError, Result};
pub use ids::{AgentId, AnchorId, AuthorityId, DelegationId};

// Authority registry
pub use authority::{Authority, AuthorityFilter, AuthorityRegistry, AuthorityType};

// Capability model
pub use capability::{
    CapabilityAttestation, CapabilityType, Constraint, ConstraintContext, ConstraintKind,
    EffectiveGrant,
};

// Trust chain store
pub use chain::{
    ChainQuery, DelegationRecord, RevocationTarget, TrustChain, TrustChainStore, TrustStatus,
};

// Engines
pub use delegation::{DelegateRequest, DelegationEngine};
pub use revocation::{ImpactPreview, RevocationEngine, RevocationOutcome, RevocationRecord};
pub use verify::{VerificationEngine, VerificationLevel, VerificationResult};

// Audit ledger
pub use audit::{
    AuditAnchor, AuditLedger, AuditQuery, AuditResult, AuditSortOrder, ChainVerification,
};
