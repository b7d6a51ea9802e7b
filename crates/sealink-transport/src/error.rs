//! Transport layer errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Transport errors.
///
/// Everything except [`Error::Transform`] ends the session.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket could not be opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Read or write failure mid-session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream, or a receive timed out.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error from core (bad tag, missing ACK, malformed frame).
    #[error("Protocol error: {0}")]
    Protocol(#[from] sealink_core::Error),

    /// Transform backend could not be initialized or instantiated.
    #[error("Crypto error: {0}")]
    Crypto(sealink_crypto::Error),

    /// A single message failed to encode or decode.
    #[error("Transform error: {0}")]
    Transform(sealink_crypto::Error),

    /// Operation not allowed in the current channel state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the session must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Transform(_))
    }
}

impl From<sealink_crypto::Error> for Error {
    fn from(err: sealink_crypto::Error) -> Self {
        if err.is_per_message() {
            Error::Transform(err)
        } else {
            Error::Crypto(err)
        }
    }
}
