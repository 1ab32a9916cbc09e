//! Encrypted state file save/load.
//!
//! File format (JSON):
//! ```json
//! {
//!   "version": 1,
//!   "encryption": { "kdf": "argon2id", "cipher": "chacha20poly1305",
//!                   "salt": "<base64>", "nonce": "<base64>" },
//!   "ciphertext": "<base64>"
//! }
//! ```
//! The ciphertext is the serialized `EngineSnapshot`, encrypted with a key
//! derived from the caller's passphrase.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::encryption;
use crate::engine::{EatpEngine, EngineSnapshot};
use crate::error::{EatpError, Result};

const STATE_FILE_VERSION: u32 = 1;

/// Encryption parameters stored alongside the ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct EncryptionMetadata {
    kdf: String,
    cipher: String,
    salt: String,
    nonce: String,
}

/// On-disk envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    encryption: EncryptionMetadata,
    ciphertext: String,
}

/// Serialize, encrypt, and write the engine's state to `path`.
pub fn save_state(engine: &EatpEngine, path: &Path, passphrase: &str) -> Result<()> {
    let snapshot = engine.snapshot();
    let plaintext =
        serde_json::to_vec(&snapshot).map_err(|e| EatpError::Serialization(e.to_string()))?;

    let (salt, nonce, ciphertext) =
        encryption::encrypt_with_passphrase(passphrase.as_bytes(), &plaintext)?;

    let file = StateFile {
        version: STATE_FILE_VERSION,
        encryption: EncryptionMetadata {
            kdf: "argon2id".into(),
            cipher: "chacha20poly1305".into(),
            salt: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, salt),
            nonce: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, nonce),
        },
        ciphertext: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, ciphertext),
    };

    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| EatpError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json.as_bytes())?;
    Ok(())
}

/// Read, decrypt, and rebuild an engine from a state file.
pub fn load_state(path: &Path, passphrase: &str) -> Result<EatpEngine> {
    let bytes = std::fs::read(path)?;
    let file: StateFile = serde_json::from_slice(&bytes).map_err(|e| {
        EatpError::InvalidFileFormat(format!("failed to parse state file {}: {e}", path.display()))
    })?;

    if file.version != STATE_FILE_VERSION {
        return Err(EatpError::InvalidFileFormat(format!(
            "unsupported state file version {}",
            file.version
        )));
    }

    let decode = |label: &str, value: &str| -> Result<Vec<u8>> {
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
            .map_err(|e| EatpError::InvalidFileFormat(format!("invalid base64 {label}: {e}")))
    };

    let salt: [u8; 16] = decode("salt", &file.encryption.salt)?
        .try_into()
        .map_err(|_| EatpError::InvalidFileFormat("salt must be 16 bytes".into()))?;
    let nonce = decode("nonce", &file.encryption.nonce)?;
    let ciphertext = decode("ciphertext", &file.ciphertext)?;

    let plaintext =
        encryption::decrypt_with_passphrase(passphrase.as_bytes(), &salt, &nonce, &ciphertext)?;

    let snapshot: EngineSnapshot = serde_json::from_slice(&plaintext)
        .map_err(|e| EatpError::InvalidFileFormat(format!("corrupt snapshot payload: {e}")))?;

    EatpEngine::from_snapshot(snapshot)
}
