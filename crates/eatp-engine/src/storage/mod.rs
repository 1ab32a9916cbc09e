//! Reference storage layer: encrypted engine state files.
//!
//! The engine itself is storage-agnostic — it defines the data model and
//! invariants any persistence layer must uphold. This module provides the
//! built-in option: the full [`crate::engine::EngineSnapshot`] serialized
//! to JSON and encrypted at rest, because snapshots contain authority
//! signing keys.

pub mod state_file;

pub use state_file::{load_state, save_state};
