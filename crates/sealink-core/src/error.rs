//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer broke the protocol: unexpected tag, missing ACK, bad payload.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Malformed frame.
    #[error("Invalid frame format: {0}")]
    InvalidFrame(String),

    /// Declared frame length exceeds the configured maximum.
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Declared length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Operation not allowed in the current handshake state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Key generation or shared-secret derivation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] sealink_crypto::Error),
}
