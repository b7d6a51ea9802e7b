//! Reversible keyed message transforms.
//!
//! The channel core only sees the [`TransformProvider`], [`Encoder`] and
//! [`Decoder`] traits. Each endpoint instantiates one encoder and one decoder
//! from a [`TransformParams`] triple; the encoder on one end and the decoder on
//! the other end must be given the same triple.
//!
//! [`AeadProvider`] is the bundled implementation. Encoded messages carry an
//! explicit sequence number:
//!
//! ```text
//! +----------------+-------------------------------+
//! | sequence (u64) | ChaCha20-Poly1305(msg) || tag |
//! +----------------+-------------------------------+
//! ```
//!
//! The sequence is big-endian, authenticated as AAD and used to build the AEAD
//! nonce. A decoder accepts a sequence only if it is not below the next one it
//! expects, so replays are rejected while a dropped or tampered message does
//! not desynchronize the ones after it.

use core::fmt;

use crate::aead::{construct_nonce, open, seal, TAG_LEN};
use crate::kdf::derive_transform_key;
use crate::{Error, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// Length of the sequence prefix on every encoded message.
pub const SEQUENCE_LEN: usize = 8;

/// Length of locally generated nonces.
pub const NONCE_LEN: usize = 16;

/// Instantiation parameters of one transform direction.
///
/// Every field is zeroed when the value is dropped, so passing it by value to
/// [`TransformProvider::encoder`] / [`TransformProvider::decoder`] is enough to
/// wipe it after instantiation, on success or failure.
pub struct TransformParams {
    secret: Zeroizing<Vec<u8>>,
    nonce: Zeroizing<Vec<u8>>,
    personalization: Zeroizing<String>,
}

impl TransformParams {
    /// Bundle a secret, nonce and personalization string.
    pub fn new(
        secret: Zeroizing<Vec<u8>>,
        nonce: Zeroizing<Vec<u8>>,
        personalization: Zeroizing<String>,
    ) -> Self {
        Self {
            secret,
            nonce,
            personalization,
        }
    }

    /// Shared secret (transform entropy).
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Nonce.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Personalization string.
    pub fn personalization(&self) -> &str {
        &self.personalization
    }
}

impl fmt::Debug for TransformParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformParams")
            .field("secret", &"<redacted>")
            .field("nonce", &"<redacted>")
            .field("personalization", &"<redacted>")
            .finish()
    }
}

/// Outbound half of a transform session.
pub trait Encoder: Send {
    /// Encode one message.
    fn encode(&mut self, plaintext: &[u8]) -> Result<Vec<u8>>;
}

/// Inbound half of a transform session.
pub trait Decoder: Send {
    /// Decode one message.
    fn decode(&mut self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Factory for encoder/decoder instances.
pub trait TransformProvider: Send + Sync {
    /// Human readable backend name, used in logs.
    fn name(&self) -> &str;

    /// Check that the backend is usable. Called before any network traffic.
    fn initialize(&self) -> Result<()>;

    /// Instantiate an encoder. `params` is consumed and wiped.
    fn encoder(&self, params: TransformParams) -> Result<Box<dyn Encoder>>;

    /// Instantiate a decoder. `params` is consumed and wiped.
    fn decoder(&self, params: TransformParams) -> Result<Box<dyn Decoder>>;
}

/// ChaCha20-Poly1305 transform keyed through HKDF-SHA256.
#[derive(Debug, Clone, Copy, Default)]
pub struct AeadProvider;

impl AeadProvider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }
}

impl TransformProvider for AeadProvider {
    fn name(&self) -> &str {
        "chacha20poly1305-hkdf-sha256"
    }

    fn initialize(&self) -> Result<()> {
        // Known-answer self test: a sealed sample must open again.
        let key = [0x5Au8; 32];
        let nonce = construct_nonce(1);
        let sealed = seal(&key, &nonce, b"self-test", b"")
            .map_err(|e| Error::TransformInit(e.to_string()))?;
        let opened =
            open(&key, &nonce, &sealed, b"").map_err(|e| Error::TransformInit(e.to_string()))?;
        if opened.as_slice() != b"self-test" {
            return Err(Error::TransformInit("self test mismatch".into()));
        }
        Ok(())
    }

    fn encoder(&self, params: TransformParams) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(AeadEncoder::instantiate(params)?))
    }

    fn decoder(&self, params: TransformParams) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(AeadDecoder::instantiate(params)?))
    }
}

/// Encoder of [`AeadProvider`].
pub struct AeadEncoder {
    key: Zeroizing<[u8; 32]>,
    next_sequence: u64,
}

impl AeadEncoder {
    /// Derive the key from `params` and start at sequence zero.
    pub fn instantiate(params: TransformParams) -> Result<Self> {
        let key = derive_transform_key(params.secret(), params.nonce(), params.personalization())
            .map_err(|e| Error::TransformInit(e.to_string()))?;
        Ok(Self {
            key,
            next_sequence: 0,
        })
    }
}

impl Encoder for AeadEncoder {
    fn encode(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let sequence = self.next_sequence;
        if sequence == u64::MAX {
            return Err(Error::Transform("encoder sequence exhausted".into()));
        }

        let header = sequence.to_be_bytes();
        let sealed = seal(&self.key, &construct_nonce(sequence), plaintext, &header)?;
        self.next_sequence += 1;

        let mut out = Vec::with_capacity(SEQUENCE_LEN + sealed.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

/// Decoder of [`AeadProvider`].
pub struct AeadDecoder {
    key: Zeroizing<[u8; 32]>,
    next_expected: u64,
}

impl AeadDecoder {
    /// Derive the key from `params` and expect sequence zero first.
    pub fn instantiate(params: TransformParams) -> Result<Self> {
        let key = derive_transform_key(params.secret(), params.nonce(), params.personalization())
            .map_err(|e| Error::TransformInit(e.to_string()))?;
        Ok(Self {
            key,
            next_expected: 0,
        })
    }
}

impl Decoder for AeadDecoder {
    fn decode(&mut self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < SEQUENCE_LEN + TAG_LEN {
            return Err(Error::Transform(format!(
                "encoded message too short: {} bytes",
                ciphertext.len()
            )));
        }

        let (header, sealed) = ciphertext.split_at(SEQUENCE_LEN);
        let mut sequence_bytes = [0u8; SEQUENCE_LEN];
        sequence_bytes.copy_from_slice(header);
        let sequence = u64::from_be_bytes(sequence_bytes);

        if sequence < self.next_expected {
            return Err(Error::Transform(format!(
                "stale sequence {} (expected at least {})",
                sequence, self.next_expected
            )));
        }

        let plaintext = open(&self.key, &construct_nonce(sequence), sealed, header)?;
        // Only an authenticated message moves the window forward.
        self.next_expected = sequence.saturating_add(1);
        Ok(plaintext)
    }
}

/// Fresh random personalization string (UUID v4 text).
pub fn random_personalization() -> Zeroizing<String> {
    Zeroizing::new(uuid::Uuid::new_v4().to_string())
}

/// Fresh random nonce of [`NONCE_LEN`] bytes.
pub fn random_nonce() -> Zeroizing<Vec<u8>> {
    let mut nonce = Zeroizing::new(vec![0u8; NONCE_LEN]);
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(secret: u8, nonce: &[u8], personalization: &str) -> TransformParams {
        TransformParams::new(
            Zeroizing::new(vec![secret; 32]),
            Zeroizing::new(nonce.to_vec()),
            Zeroizing::new(personalization.to_string()),
        )
    }

    fn pair() -> (Box<dyn Encoder>, Box<dyn Decoder>) {
        let provider = AeadProvider::new();
        let encoder = provider.encoder(params(9, b"nonce", "pers")).unwrap();
        let decoder = provider.decoder(params(9, b"nonce", "pers")).unwrap();
        (encoder, decoder)
    }

    #[test]
    fn test_initialize_self_test() {
        assert!(AeadProvider::new().initialize().is_ok());
    }

    #[test]
    fn test_round_trip_sizes() {
        let (mut encoder, mut decoder) = pair();
        for size in [0usize, 1, 4, 1500, 64 * 1024] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let encoded = encoder.encode(&plaintext).unwrap();
            assert_eq!(encoded.len(), SEQUENCE_LEN + size + TAG_LEN);
            let decoded = decoder.decode(&encoded).unwrap();
            assert_eq!(&decoded[..], &plaintext[..], "size {}", size);
        }
    }

    #[test]
    fn test_encoding_is_stateful() {
        let (mut encoder, _) = pair();
        let first = encoder.encode(b"same").unwrap();
        let second = encoder.encode(b"same").unwrap();
        assert_ne!(first, second);
        assert_eq!(&first[..SEQUENCE_LEN], &0u64.to_be_bytes());
        assert_eq!(&second[..SEQUENCE_LEN], &1u64.to_be_bytes());
    }

    #[test]
    fn test_mismatched_params_fail() {
        let provider = AeadProvider::new();
        let mut encoder = provider.encoder(params(9, b"nonce", "pers")).unwrap();
        let mut decoder = provider.decoder(params(9, b"nonce", "other")).unwrap();
        let encoded = encoder.encode(b"hello").unwrap();
        assert!(matches!(decoder.decode(&encoded), Err(Error::Transform(_))));
    }

    #[test]
    fn test_tampered_message_does_not_desync() {
        let (mut encoder, mut decoder) = pair();

        let mut tampered = encoder.encode(b"first").unwrap();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x80;
        assert!(decoder.decode(&tampered).unwrap_err().is_per_message());

        let next = encoder.encode(b"second").unwrap();
        assert_eq!(&decoder.decode(&next).unwrap()[..], b"second");
    }

    #[test]
    fn test_replay_rejected() {
        let (mut encoder, mut decoder) = pair();
        let encoded = encoder.encode(b"once").unwrap();
        decoder.decode(&encoded).unwrap();
        assert!(decoder.decode(&encoded).is_err());
    }

    #[test]
    fn test_truncated_message_rejected() {
        let (_, mut decoder) = pair();
        assert!(decoder.decode(&[0u8; SEQUENCE_LEN + TAG_LEN - 1]).is_err());
    }

    #[test]
    fn test_empty_secret_fails_instantiation() {
        let provider = AeadProvider::new();
        let empty = TransformParams::new(
            Zeroizing::new(Vec::new()),
            Zeroizing::new(vec![1]),
            Zeroizing::new("p".into()),
        );
        assert!(matches!(
            provider.encoder(empty),
            Err(Error::TransformInit(_))
        ));
    }

    #[test]
    fn test_params_debug_is_redacted() {
        let p = params(1, b"n", "secret-personalization");
        let rendered = format!("{:?}", p);
        assert!(!rendered.contains("secret-personalization"));
    }

    #[test]
    fn test_random_material() {
        assert_eq!(random_nonce().len(), NONCE_LEN);
        assert_ne!(*random_nonce(), *random_nonce());
        assert_eq!(random_personalization().len(), 36);
    }
}
