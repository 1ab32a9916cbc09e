//! Audit ledger — append-only, hash-linked, signed anchors.
//!
//! Every audited action produces exactly one [`AuditAnchor`]. Anchors form
//! a per-agent singly-linked hash chain via `parent_anchor_id`; integrity
//! verification recomputes every hash and signature from the earliest
//! anchor forward and reports the first break.

pub mod anchor;
pub mod export;
pub mod ledger;
pub mod query;
pub mod verify;

pub use anchor::{AuditAnchor, AuditResult};
pub use export::{export_csv, export_json};
pub use ledger::AuditLedger;
pub use query::{query_anchors, AuditQuery, AuditSortOrder};
pub use verify::{ensure_integrity, verify_chain, ChainVerification};
