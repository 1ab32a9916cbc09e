//! Delegation engine — validated creation of delegation edges.

pub mod engine;

pub use engine::{DelegateRequest, DelegationEngine};
