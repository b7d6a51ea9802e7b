//! Protocol engine for sealink channels.
//!
//! - Length-prefixed frame codec, tagged and untagged
//! - Handshake state machine negotiating per-direction transform parameters
//!
//! No I/O happens here; `sealink-transport` drives these types over TCP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod negotiator;

pub use error::{Error, Result};
pub use frame::{FrameDecoder, OutboundFrame, Tag, TaggedFrame};
pub use negotiator::{HandshakeState, NegotiatedSecrets, Negotiator, Role, Step};
