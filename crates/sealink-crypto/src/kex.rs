//! Key exchange.
//!
//! Only ECDH over NIST P-256 is used: each direction of a channel gets its
//! own ephemeral key pair and its own shared secret.

pub mod ecdh_p256;

pub use self::ecdh_p256::{EcdhP256KeyPair, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
