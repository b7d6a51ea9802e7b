//! ECDH over NIST P-256.
//!
//! Every channel direction uses a fresh key pair. Public keys travel in SEC 1
//! uncompressed form (`0x04 || x || y`, 65 bytes) and the shared secret is the
//! 32-byte x-coordinate of the agreed point.
//!
//! # Security
//!
//! - The private scalar is zeroed by `p256::SecretKey` when dropped.
//! - The cached public key and every shared secret live in `Zeroizing<>`.
//! - [`EcdhP256KeyPair::agree`] consumes both the key pair and the peer key, so
//!   neither can be used a second time once a secret exists.
//!
//! # Example
//!
//! ```
//! use sealink_crypto::kex::EcdhP256KeyPair;
//!
//! # fn example() -> Result<(), sealink_crypto::Error> {
//! let client = EcdhP256KeyPair::generate()?;
//! let server = EcdhP256KeyPair::generate()?;
//!
//! let client_secret = client.exchange(server.public_key())?;
//! let server_secret = server.exchange(client.public_key())?;
//! assert_eq!(*client_secret, *server_secret);
//! # Ok(())
//! # }
//! ```

use core::fmt;

use crate::{Error, Result};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use zeroize::Zeroizing;

/// Length of an uncompressed SEC 1 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of the ECDH shared secret.
pub const SHARED_SECRET_LEN: usize = 32;

/// Ephemeral P-256 key pair.
pub struct EcdhP256KeyPair {
    secret_key: SecretKey,
    /// Uncompressed public key, cached.
    public_key_bytes: Zeroizing<Vec<u8>>,
}

impl EcdhP256KeyPair {
    /// Generate a new random key pair from the OS RNG.
    ///
    /// # Errors
    ///
    /// Returns a `Result` so callers can treat key generation uniformly with
    /// the other fallible primitives; it does not fail with the OS RNG.
    pub fn generate() -> Result<Self> {
        let secret_key = SecretKey::random(&mut rand::rngs::OsRng);
        Ok(Self::from_secret(secret_key))
    }

    /// Rebuild a key pair from a 32-byte big-endian private scalar.
    ///
    /// Intended for fixed test vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the scalar has the wrong length or is not a valid
    /// P-256 private key (zero or above the curve order).
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != 32 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 private key must be 32 bytes, got {}",
                private_key.len()
            )));
        }

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("scalar out of range for P-256".into()))?;
        Ok(Self::from_secret(secret_key))
    }

    fn from_secret(secret_key: SecretKey) -> Self {
        let encoded = secret_key.public_key().to_encoded_point(false);
        Self {
            secret_key,
            public_key_bytes: Zeroizing::new(encoded.as_bytes().to_vec()),
        }
    }

    /// Public key in uncompressed form (65 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Compute the shared secret with a peer's uncompressed public key.
    ///
    /// # Errors
    ///
    /// Fails if the peer key is not 65 bytes, is not in uncompressed form or
    /// is not a point on the curve.
    pub fn exchange(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>> {
        let peer = parse_public_key(peer_public)?;

        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), peer.as_affine());

        let mut secret = Zeroizing::new([0u8; SHARED_SECRET_LEN]);
        secret.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(secret)
    }

    /// Single-use agreement: consumes the key pair and the peer's key.
    ///
    /// Both the private scalar and the peer key buffer are zeroed when this
    /// returns, whether or not the agreement succeeded.
    pub fn agree(self, peer_public: Zeroizing<Vec<u8>>) -> Result<Zeroizing<[u8; SHARED_SECRET_LEN]>> {
        self.exchange(&peer_public)
    }
}

impl fmt::Debug for EcdhP256KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhP256KeyPair")
            .field("secret_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(Error::InvalidKeyLength(format!(
            "P-256 public key must be {} bytes (uncompressed), got {}",
            PUBLIC_KEY_LEN,
            bytes.len()
        )));
    }
    if bytes[0] != 0x04 {
        return Err(Error::InvalidPublicKey(
            "P-256 public key must use uncompressed format (0x04 prefix)".into(),
        ));
    }

    let point = EncodedPoint::from_bytes(bytes)
        .map_err(|_| Error::InvalidPublicKey("malformed SEC 1 encoding".into()))?;

    PublicKey::from_encoded_point(&point)
        .into_option()
        .ok_or_else(|| Error::InvalidPublicKey("point is not on the P-256 curve".into()))
}
