//! Error types for the EATP engine.
//!
//! All errors are strongly typed and propagated without panicking.
//! Domain errors carry the context fields a calling layer needs to render
//! distinct failure states; private key material never appears in messages.

/// EATP error types covering all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EatpError {
    #[error("Parent authority is inactive: {authority_id}")]
    ParentInactive { authority_id: String },

    #[error("Authority is inactive and cannot issue trust: {authority_id}")]
    AuthorityInactive { authority_id: String },

    #[error("An active genesis trust chain already exists for agent: {agent_id}")]
    DuplicateGenesis { agent_id: String },

    #[error("Capability not in delegator's effective set: {capability}")]
    CapabilityEscalation { capability: String },

    #[error("Constraint widens existing {dimension} restriction: {detail}")]
    ConstraintConflict { dimension: String, detail: String },

    #[error("Upstream node revoked: {node_id}")]
    RevokedUpstream { node_id: String },

    #[error("Upstream node expired: {node_id}")]
    ExpiredUpstream { node_id: String },

    #[error("An agent cannot delegate to itself: {agent_id}")]
    SelfDelegation { agent_id: String },

    #[error(
        "Concurrent modification of lineage for {agent_id}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        agent_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Audit chain integrity broken for {agent_id} at anchor {broken_at}")]
    ChainIntegrity { agent_id: String, broken_at: String },

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EatpError {
    /// Whether the caller may retry the operation (infrastructure faults),
    /// as opposed to terminal domain errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::Storage(_) | Self::Io(_)
        )
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, EatpError>;
