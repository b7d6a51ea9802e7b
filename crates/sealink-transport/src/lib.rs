//! TCP transport for sealink channels.
//!
//! - [`tcp`]: length-prefixed framing with a single-writer Transmission Lock
//! - [`channel`]: client controller (`Offline -> ... -> Secured`) with an
//!   ordered event queue
//! - [`server`]: listener and per-connection server sessions
//! - [`session`]: security-mode setup shared by both ends
//!
//! Three security modes are supported: plain, pre-shared parameters, and
//! ECDH-negotiated parameters (default).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
mod dispatcher;
pub mod error;
pub mod server;
pub mod session;
pub mod tcp;

pub use channel::{Channel, ChannelEvent, ChannelState};
pub use config::{ChannelConfig, PresharedSecrets, SecurityMode, ServerConfig, TransportLimits};
pub use error::{Error, Result};
pub use server::{SecureServer, ServerSession};
pub use tcp::{FramedListener, FramedTransport};
