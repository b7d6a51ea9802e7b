//! Cryptographic building blocks for sealink channels.
//!
//! - Key exchange: ECDH over P-256, one ephemeral key pair per direction
//! - Key derivation: HKDF-SHA256 from `{secret, nonce, personalization}`
//! - Message transform: ChaCha20-Poly1305 with sequence-numbered messages
//!
//! Secret material is held in `Zeroizing` wrappers and is never logged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod transform;

pub use error::{Error, Result};
pub use transform::{AeadProvider, Decoder, Encoder, TransformParams, TransformProvider};
