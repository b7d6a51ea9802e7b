//! ChaCha20-Poly1305 (RFC 8439) used by the AEAD transform.

use crate::{Error, Result};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::Zeroizing;

/// Length of the Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Build a 12-byte AEAD nonce from a message sequence number.
///
/// `nonce[0:4]` is zero, `nonce[4:12]` is the sequence number in little-endian.
///
/// ```
/// use sealink_crypto::aead::construct_nonce;
///
/// let nonce = construct_nonce(0x0807060504030201);
/// assert_eq!(nonce, [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
/// ```
pub fn construct_nonce(sequence: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&sequence.to_le_bytes());
    nonce
}

/// Encrypt and authenticate `plaintext`; returns `ciphertext || tag`.
pub fn seal(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Transform("ChaCha20-Poly1305 encryption failed".into()))
}

/// Verify and decrypt `ciphertext || tag`.
///
/// # Errors
/// Returns `Error::Transform` if the tag does not verify.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext_and_tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext_and_tag.len() < TAG_LEN {
        return Err(Error::Transform(format!(
            "ciphertext shorter than the {}-byte tag",
            TAG_LEN
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map_err(|_| Error::Transform("authentication failed".into()))?;

    Ok(Zeroizing::new(plaintext))
}
