//! Cryptographic primitives for the EATP engine.
//!
//! - [`keys`] — Ed25519 key pairs for authorities.
//! - [`signing`] — signing and verification of anchor and revocation hashes.
//! - [`derivation`] — HKDF-derived revocation keys scoped per node.
//! - [`encryption`] — passphrase encryption for state files at rest.
//! - [`random`] — OS-backed random bytes for nonces and salts.

pub mod derivation;
pub mod encryption;
pub mod keys;
pub mod random;
pub mod signing;

pub use keys::Ed25519KeyPair;
