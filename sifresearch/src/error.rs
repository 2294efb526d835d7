//! Error types for `SifreSearch` operations.

use std::fmt;

use crate::field::FieldKind;

/// Main error type for `SifreSearch` operations.
///
/// None of these are retried internally. An encoding error aborts the whole
/// document or batch so that a partially encrypted body never reaches the
/// index engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key material rejected at construction
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Integer domain rejected at construction
    #[error("invalid integer range: [{min}, {max}]")]
    InvalidRange {
        /// Lower bound as configured
        min: i64,
        /// Upper bound as configured
        max: i64,
    },

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed (wrong key, corrupted or foreign ciphertext)
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Plaintext outside the configured order-preserving domain
    #[error("value {value} outside the encryptable range [{min}, {max}]")]
    OutOfRange {
        /// The rejected value
        value: i64,
        /// Lowest encryptable value
        min: i64,
        /// Highest encryptable value
        max: i64,
    },

    /// Document field without a field spec
    #[error("field `{0}` has no field spec")]
    UnknownField(String),

    /// Field declared twice, or colliding with a full-text companion field
    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),

    /// Value type does not match the declared field kind
    #[error("field `{field}` is declared {expected} but holds {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared kind
        expected: FieldKind,
        /// Name of the value type actually supplied
        found: &'static str,
    },

    /// Bulk column/row realignment failed
    #[error("batch alignment broken: {0}")]
    Alignment(String),

    /// Local tokenization failed
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Background encoding task panicked or was cancelled
    #[error("task failed: {0}")]
    Task(String),

    /// Index engine operation failed
    #[error("index gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Errors reported by an index engine behind [`IndexGateway`](crate::gateway::IndexGateway).
#[derive(Debug)]
pub enum GatewayError {
    /// Index does not exist
    IndexNotFound(String),

    /// Index already exists
    IndexExists(String),

    /// Analyzer is not registered on the index
    AnalyzerNotFound(String),

    /// Engine rejected the request (bad query, mapping conflict, ...)
    Rejected(String),

    /// Engine could not be reached
    Unavailable(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexNotFound(name) => write!(f, "index not found: {name}"),
            Self::IndexExists(name) => write!(f, "index already exists: {name}"),
            Self::AnalyzerNotFound(name) => write!(f, "analyzer not found: {name}"),
            Self::Rejected(msg) => write!(f, "request rejected: {msg}"),
            Self::Unavailable(msg) => write!(f, "engine unavailable: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
