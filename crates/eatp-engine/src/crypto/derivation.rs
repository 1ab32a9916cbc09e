//! Key derivation using HKDF-SHA256.
//!
//! Derives scoped revocation signing keys from an authority's root key
//! using per-node context strings, so a revocation can be signed without
//! reusing the root key directly.

use ed25519_dalek::SigningKey;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{EatpError, Result};

/// Derive a 32-byte child key from a root key and context string.
///
/// Uses HKDF-SHA256 (RFC 5869) with the root key as IKM and the context
/// as info.
pub fn derive_key(root_key_bytes: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, root_key_bytes);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| EatpError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Derive an Ed25519 signing key from a root key and context.
pub fn derive_signing_key(root_key_bytes: &[u8; 32], context: &str) -> Result<SigningKey> {
    let derived = derive_key(root_key_bytes, context)?;
    Ok(SigningKey::from_bytes(&derived))
}

/// Derivation context for the revocation key covering one graph node.
pub fn revocation_context(node_id: &str) -> String {
    format!("eatp/revocation/{node_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Ed25519KeyPair;

    #[test]
    fn test_derivation_deterministic() {
        let root = [42u8; 32];
        let ctx = revocation_context("adeleg_abc");
        let a = derive_key(&root, &ctx).unwrap();
        let b = derive_key(&root, &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_nodes_different_keys() {
        let root = [42u8; 32];
        let a = derive_key(&root, &revocation_context("adeleg_a")).unwrap();
        let b = derive_key(&root, &revocation_context("adeleg_b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_roots_different_keys() {
        let a = derive_key(&[1u8; 32], &revocation_context("adeleg_a")).unwrap();
        let b = derive_key(&[2u8; 32], &revocation_context("adeleg_a")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_derived_key_signs() {
        let kp = Ed25519KeyPair::generate();
        let derived =
            derive_signing_key(&kp.signing_key_bytes(), &revocation_context("agent-1")).unwrap();
        assert_eq!(derived.verifying_key().to_bytes().len(), 32);
    }
}
