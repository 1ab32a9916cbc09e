//! Verification engine — deciding whether a requested action is authorized.

pub mod engine;

pub use engine::{VerificationEngine, VerificationLevel, VerificationResult};
