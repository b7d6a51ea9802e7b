//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
///
/// Key agreement and derivation failures are fatal to a handshake.
/// `Transform` failures concern a single message.
#[derive(Debug, Error)]
pub enum Error {
    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid key length.
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(String),

    /// Invalid private key.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The transform backend could not be initialized.
    #[error("Transform initialization failed: {0}")]
    TransformInit(String),

    /// Encode or decode of a single message failed.
    #[error("Transform failed: {0}")]
    Transform(String),
}

impl Error {
    /// Whether this error concerns one message only (the session stays usable).
    pub fn is_per_message(&self) -> bool {
        matches!(self, Error::Transform(_))
    }
}
