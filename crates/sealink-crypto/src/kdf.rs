//! Key derivation (HKDF-SHA256).
//!
//! A transform instance is keyed from its `{secret, nonce, personalization}`
//! triple:
//!
//! - IKM: the ECDH shared secret (or the pre-shared secret)
//! - Salt: the nonce received from / generated for that direction
//! - Info: `"sealink-transform-v1" || personalization`
//! - Length: 32 bytes

use crate::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Domain-separation label prefixed to the personalization string.
pub const TRANSFORM_INFO_LABEL: &[u8] = b"sealink-transform-v1";

/// Generic HKDF-SHA256 per RFC 5869.
///
/// # Example
/// ```
/// use sealink_crypto::kdf::hkdf_sha256;
///
/// let okm = hkdf_sha256(&[0x0b; 22], b"salt", b"info", 42).unwrap();
/// assert_eq!(okm.len(), 42);
/// ```
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = Zeroizing::new(vec![0u8; output_len]);
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation(format!("HKDF cannot expand to {} bytes", output_len)))?;

    Ok(okm)
}

/// Derive the 32-byte AEAD key of one transform direction.
///
/// Encoder on one end and decoder on the other end derive the same key when
/// they were given the same triple.
pub fn derive_transform_key(
    secret: &[u8],
    nonce: &[u8],
    personalization: &str,
) -> Result<Zeroizing<[u8; 32]>> {
    if secret.is_empty() {
        return Err(Error::KeyDerivation("empty transform secret".into()));
    }

    let mut info = Zeroizing::new(Vec::with_capacity(
        TRANSFORM_INFO_LABEL.len() + personalization.len(),
    ));
    info.extend_from_slice(TRANSFORM_INFO_LABEL);
    info.extend_from_slice(personalization.as_bytes());

    let okm = hkdf_sha256(secret, nonce, &info, 32)?;

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&okm);
    Ok(key)
}
