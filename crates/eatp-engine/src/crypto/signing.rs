//! Ed25519 signing and verification over anchor and revocation hashes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{EatpError, Result};

/// Sign a message and return the signature as a base64-encoded string.
pub fn sign_to_base64(signing_key: &SigningKey, message: &[u8]) -> String {
    let sig = signing_key.sign(message);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, sig.to_bytes())
}

/// Verify a base64-encoded signature against a public key and message.
pub fn verify_from_base64(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signature_b64)
            .map_err(|e| EatpError::InvalidKey(format!("invalid base64 signature: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| EatpError::InvalidKey("signature must be 64 bytes".into()))?;

    let signature = Signature::from_bytes(&sig_array);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| EatpError::SignatureInvalid)
}

/// Decode a base64 public key and verify a base64 signature in one step.
pub fn verify_with_key_base64(key_b64: &str, message: &[u8], signature_b64: &str) -> Result<()> {
    let pub_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_b64)
        .map_err(|e| EatpError::InvalidKey(format!("invalid base64 public key: {e}")))?;

    let key_bytes: [u8; 32] = pub_bytes
        .try_into()
        .map_err(|_| EatpError::InvalidKey("public key must be 32 bytes".into()))?;

    let verifying_key = super::keys::Ed25519KeyPair::verifying_key_from_bytes(&key_bytes)?;
    verify_from_base64(&verifying_key, message, signature_b64)
}
