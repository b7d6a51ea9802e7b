//! Length-prefixed framing.
//!
//! Two frame layouts share the same 4-byte big-endian length prefix:
//!
//! ```text
//! tagged:   | length: u32 BE | tag: u8 | payload[length - 1] |
//! untagged: | length: u32 BE | payload[length]               |
//! ```
//!
//! `length` always counts exactly the bytes that follow it. Receivers keep
//! the tag as the first byte of the frame body and split it off with
//! [`TaggedFrame::parse`].

use crate::{Error, Result};
use zeroize::Zeroizing;

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a frame body (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Body of an acknowledgment frame.
pub const ACK_BODY: &[u8] = b"ACK";

/// Body of an error frame.
pub const ERR_BODY: &[u8] = b"ERR";

/// Frame tags used on the wire.
///
/// The `'2'`/`'4'` slots carry personalization strings when sent by the
/// client and nonces when sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Sender's encoder public key (`'1'`).
    EncoderPublicKey = b'1',
    /// Sender's encoder personalization or nonce (`'2'`).
    EncoderParam = b'2',
    /// Sender's decoder public key (`'3'`).
    DecoderPublicKey = b'3',
    /// Sender's decoder personalization or nonce (`'4'`).
    DecoderParam = b'4',
    /// Acknowledgment (`'A'`).
    Ack = b'A',
    /// Error (`'E'`).
    Error = b'E',
    /// Application message (`'m'`).
    Message = b'm',
}

impl Tag {
    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'1' => Some(Self::EncoderPublicKey),
            b'2' => Some(Self::EncoderParam),
            b'3' => Some(Self::DecoderPublicKey),
            b'4' => Some(Self::DecoderParam),
            b'A' => Some(Self::Ack),
            b'E' => Some(Self::Error),
            b'm' => Some(Self::Message),
            _ => None,
        }
    }
}

/// Serialize one frame.
///
/// With `tag`, the length prefix is `payload.len() + 1`.
///
/// # Errors
///
/// Returns `InvalidFrame` if the body does not fit a `u32` length.
///
/// ```
/// use sealink_core::frame::encode_frame;
///
/// let frame = encode_frame(Some(b'A'), b"ACK").unwrap();
/// assert_eq!(frame, [0, 0, 0, 4, b'A', b'A', b'C', b'K']);
/// ```
pub fn encode_frame(tag: Option<u8>, payload: &[u8]) -> Result<Vec<u8>> {
    let body_len = payload.len() + usize::from(tag.is_some());
    let prefix = u32::try_from(body_len)
        .map_err(|_| Error::InvalidFrame(format!("body of {} bytes exceeds u32", body_len)))?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + body_len);
    out.extend_from_slice(&prefix.to_be_bytes());
    if let Some(tag) = tag {
        out.push(tag);
    }
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode a length prefix and check it against `max_len`.
pub fn parse_length_prefix(prefix: [u8; LENGTH_PREFIX_LEN], max_len: usize) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(Error::FrameTooLarge { len, max: max_len });
    }
    Ok(len)
}

/// A received frame body split into tag and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedFrame<'a> {
    /// Raw tag byte.
    pub tag: u8,
    /// Payload after the tag.
    pub payload: &'a [u8],
}

impl<'a> TaggedFrame<'a> {
    /// Split a frame body (tag retained as first byte) into tag and payload.
    ///
    /// # Errors
    ///
    /// An empty body has no tag and is rejected.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        match body.split_first() {
            Some((&tag, payload)) => Ok(Self { tag, payload }),
            None => Err(Error::InvalidFrame("tagged frame without tag byte".into())),
        }
    }

    /// Known tag, if any.
    pub fn kind(&self) -> Option<Tag> {
        Tag::from_u8(self.tag)
    }

    /// Whether this is an `'A'` frame carrying `"ACK"`.
    pub fn is_ack(&self) -> bool {
        self.kind() == Some(Tag::Ack) && self.payload == ACK_BODY
    }
}

/// An outbound tagged frame produced by the handshake.
///
/// The payload is wiped on drop; it may hold public keys or nonces.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Tag.
    pub tag: Tag,
    /// Payload.
    pub payload: Zeroizing<Vec<u8>>,
}

impl OutboundFrame {
    /// Build a frame.
    pub fn new(tag: Tag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: Zeroizing::new(payload.into()),
        }
    }

    /// `'A'` / `"ACK"`.
    pub fn ack() -> Self {
        Self::new(Tag::Ack, ACK_BODY)
    }

    /// `'E'` / `"ERR"`.
    pub fn error() -> Self {
        Self::new(Tag::Error, ERR_BODY)
    }

    /// Serialize with [`encode_frame`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(Some(self.tag.to_u8()), &self.payload)
    }
}

/// Incremental decoder for a byte stream of length-prefixed frames.
///
/// Bytes can arrive in arbitrary pieces; [`FrameDecoder::decode`] returns a
/// body only once all of its bytes are buffered and never consumes bytes of
/// the following frame.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameDecoder {
    /// Decoder with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Decoder with a custom body limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame body, if one is buffered.
    ///
    /// # Errors
    ///
    /// `FrameTooLarge` if the pending prefix exceeds the limit. The decoder
    /// should be discarded afterwards since the stream is out of sync.
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_LEN]);
        let len = parse_length_prefix(prefix, self.max_len)?;

        let total = LENGTH_PREFIX_LEN + len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let body = self.buffer[LENGTH_PREFIX_LEN..total].to_vec();
        self.buffer.drain(..total);
        Ok(Some(body))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
