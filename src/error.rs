//! Error taxonomy for the consensus core.
//!
//! Each layer gets its own narrow, matchable error enum; `NodeError` wraps them
//! at the daemon boundary so callers can use `?` freely without the library
//! itself depending on `anyhow`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key encoding")]
    InvalidKey,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("hash operation failed: {0}")]
    HashFailure(String),

    #[error("VRF operation failed: {0}")]
    Vrf(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("insufficient VRF announcements: got {got}, need {need}")]
    InsufficientVRFs { got: usize, need: usize },

    #[error("proof-of-work mining timed out after {timeout_secs}s")]
    PoWTimeout { timeout_secs: u64 },

    #[error("round aborted")]
    RoundAborted,

    #[error("height mismatch: expected {expected}, committed {committed}")]
    HeightMismatch { expected: u64, committed: u64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Discriminated outcome of the five-step block validator (§4.7).
///
/// The validator never throws for a rule failure — only for malformed inputs
/// (`ValidationError::MalformedBlock`). A rule failure is reported through
/// `ValidationOutcome::Fail`, not propagated as a Rust error, matching the
/// "discriminated outcome replaces exceptions-as-flow" design note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Ok,
    Fail(ValidationError, String),
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationOutcome::Ok)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("VRF integrity check failed")]
    VRFFailure,

    #[error("proposer is not the highest-scoring announcement")]
    ProposerMismatch,

    #[error("reward list does not match top-scoring announcements")]
    RewardMismatch,

    #[error("proof-of-work check failed")]
    PoWFailure,

    #[error("transaction validation failed")]
    TxFailure,

    #[error("malformed block: {0}")]
    MalformedBlock(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("storage IO error: {0}")]
    Io(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
