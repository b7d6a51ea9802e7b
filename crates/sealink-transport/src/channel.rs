//! Client-side channel controller.
//!
//! A [`Channel`] is an explicit context object owned by the application. It
//! walks `Offline -> Opening -> Connected -> Secured`, then alternates
//! between `Secured` and `AwaitingReply` for each round trip. All state
//! changes happen in `&mut self` methods on the caller's task; socket work
//! for a round trip runs on a spawned task and comes back through the
//! dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use sealink_transport::{Channel, ChannelConfig, ChannelEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> sealink_transport::Result<()> {
//! let mut channel = Channel::new(ChannelConfig::new("127.0.0.1", 27015));
//! channel.connect().await?;
//! channel.send(b"hello")?;
//! while let Some(event) = channel.next_event().await {
//!     if let ChannelEvent::MessageReceived(reply) = event {
//!         println!("{}", String::from_utf8_lossy(&reply));
//!     }
//! }
//! channel.terminate().await;
//! # Ok(())
//! # }
//! ```

use core::fmt;
use std::sync::Arc;

use crate::config::{ChannelConfig, SecurityMode};
use crate::dispatcher::{Completion, Dispatcher};
use crate::session::{establish, TransformSession};
use crate::tcp::FramedTransport;
use crate::{Error, Result};
use sealink_core::frame::Tag;
use sealink_core::{Role, TaggedFrame};
use sealink_crypto::{AeadProvider, TransformProvider};
use tokio::task::JoinHandle;

/// Display text for a successful connect.
pub const READY: &str = "Ready";
/// Display text for a secured channel.
pub const SECURED: &str = "TRUE";
/// Display text for a failed setup.
pub const SETUP_FAILED: &str = "initialization failed";

/// Channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection.
    Offline,
    /// Connecting.
    Opening,
    /// Socket open, no transform yet.
    Connected,
    /// Transforms ready; `send` accepted.
    Secured,
    /// One round trip in flight.
    AwaitingReply,
}

/// Notifications for the consumer, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Socket opened.
    Connected,
    /// Transforms instantiated.
    Secured,
    /// Setup failed; the channel is offline.
    SetupFailed(String),
    /// Decoded reply to the last `send`.
    MessageReceived(Vec<u8>),
    /// The last round trip completed but its message could not be processed.
    MessageFailed(String),
    /// Connection lost while waiting for a reply; the channel is offline.
    Disconnected(String),
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::Connected => f.write_str(READY),
            ChannelEvent::Secured => f.write_str(SECURED),
            ChannelEvent::SetupFailed(reason) => write!(f, "{}: {}", SETUP_FAILED, reason),
            ChannelEvent::MessageReceived(bytes) => {
                write!(f, "{}", String::from_utf8_lossy(bytes))
            }
            ChannelEvent::MessageFailed(reason) => write!(f, "message failed: {}", reason),
            ChannelEvent::Disconnected(reason) => write!(f, "disconnected: {}", reason),
        }
    }
}

/// Client endpoint of a secure channel.
pub struct Channel {
    config: ChannelConfig,
    provider: Arc<dyn TransformProvider>,
    transport: FramedTransport,
    state: ChannelState,
    transforms: Option<TransformSession>,
    dispatcher: Dispatcher<ChannelEvent>,
    in_flight: Option<JoinHandle<()>>,
    round: u64,
}

impl Channel {
    /// Channel using the bundled [`AeadProvider`].
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_provider(config, Arc::new(AeadProvider::new()))
    }

    /// Channel using a custom transform provider.
    pub fn with_provider(config: ChannelConfig, provider: Arc<dyn TransformProvider>) -> Self {
        let transport = FramedTransport::new(config.limits());
        Self {
            config,
            provider,
            transport,
            state: ChannelState::Offline,
            transforms: None,
            dispatcher: Dispatcher::new(),
            in_flight: None,
            round: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether transforms are ready and no setup is pending.
    pub fn is_secured(&self) -> bool {
        self.transforms.is_some()
            && matches!(
                self.state,
                ChannelState::Secured | ChannelState::AwaitingReply
            )
    }

    /// Configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// State in which `send` is accepted: `Secured`, or `Connected` for
    /// plain channels which never get a transform.
    fn ready_state(&self) -> ChannelState {
        match self.config.security {
            SecurityMode::Plain => ChannelState::Connected,
            _ => ChannelState::Secured,
        }
    }

    /// Open the socket and run setup for the configured security mode.
    ///
    /// Posts `Connected` and `Secured` events on the way. On failure the
    /// channel is back to `Offline`, a `SetupFailed` event is posted and the
    /// error is returned; nothing is retried.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ChannelState::Offline {
            return Err(Error::InvalidState(format!(
                "connect requires Offline, current state is {:?}",
                self.state
            )));
        }

        match self.setup().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "channel setup failed");
                self.teardown().await;
                self.dispatcher.post(ChannelEvent::SetupFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn setup(&mut self) -> Result<()> {
        if self.config.security.has_transform() {
            // Before any traffic.
            self.provider.initialize().map_err(Error::Crypto)?;
        }

        self.set_state(ChannelState::Opening);
        self.transport
            .open(&self.config.host, self.config.port)
            .await?;
        self.set_state(ChannelState::Connected);
        self.dispatcher.post(ChannelEvent::Connected);

        let transforms = establish(
            &self.transport,
            Role::Client,
            &self.config.security,
            self.provider.as_ref(),
        )
        .await?;

        if let Some(transforms) = transforms {
            self.transforms = Some(transforms);
            self.set_state(ChannelState::Secured);
            self.dispatcher.post(ChannelEvent::Secured);
        }
        Ok(())
    }

    /// Start one round trip.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the channel is ready; the transport is not
    /// touched. `Transform` if the message cannot be encoded; the channel
    /// stays ready.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        if self.state != self.ready_state() {
            return Err(Error::InvalidState(format!(
                "send requires {:?}, current state is {:?}",
                self.ready_state(),
                self.state
            )));
        }

        let payload = match self.transforms.as_mut() {
            Some(transforms) => transforms.encode(plaintext)?,
            None => plaintext.to_vec(),
        };
        let tag = self.config.security.is_tagged().then(|| Tag::Message.to_u8());

        self.round += 1;
        let round = self.round;
        let transport = self.transport.clone();
        let results = self.dispatcher.handle();
        self.in_flight = Some(tokio::spawn(async move {
            let result = match transport.send(tag, &payload).await {
                Ok(()) => transport.receive().await,
                Err(e) => Err(e),
            };
            let _ = results.send(Completion::Reply { round, result });
        }));

        self.set_state(ChannelState::AwaitingReply);
        Ok(())
    }

    /// Next event, in order.
    ///
    /// Returns `None` when nothing is queued and no reply is pending.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let completion = match self.dispatcher.try_next() {
                Some(completion) => completion,
                None if self.state == ChannelState::AwaitingReply => {
                    self.dispatcher.next().await?
                }
                None => return None,
            };

            match completion {
                Completion::Event(event) => return Some(event),
                Completion::Reply { round, result } => {
                    if round != self.round || self.state != ChannelState::AwaitingReply {
                        tracing::debug!(round, "dropping stale reply");
                        continue;
                    }
                    self.in_flight = None;
                    return Some(self.complete_round_trip(result).await);
                }
            }
        }
    }

    async fn complete_round_trip(&mut self, result: Result<Vec<u8>>) -> ChannelEvent {
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "connection lost awaiting reply");
                self.teardown().await;
                return ChannelEvent::Disconnected(e.to_string());
            }
        };

        match self.open_reply(&body) {
            Ok(plaintext) => {
                self.set_state(self.ready_state());
                ChannelEvent::MessageReceived(plaintext)
            }
            Err(e) if !e.is_fatal() => {
                tracing::debug!(error = %e, "reply failed to decode");
                self.set_state(self.ready_state());
                ChannelEvent::MessageFailed(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid reply");
                self.teardown().await;
                ChannelEvent::Disconnected(e.to_string())
            }
        }
    }

    /// Strip the tag (tagged mode) and decode.
    fn open_reply(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let payload = if self.config.security.is_tagged() {
            let frame = TaggedFrame::parse(body)?;
            match frame.kind() {
                Some(Tag::Message) => frame.payload,
                Some(Tag::Error) => {
                    return Err(Error::Transform(sealink_crypto::Error::Transform(
                        "peer could not process the message".into(),
                    )))
                }
                _ => {
                    return Err(sealink_core::Error::ProtocolViolation(format!(
                        "unexpected reply tag 0x{:02x}",
                        frame.tag
                    ))
                    .into())
                }
            }
        } else {
            body
        };

        match self.transforms.as_mut() {
            Some(transforms) => Ok(transforms.decode(payload)?.to_vec()),
            None => Ok(payload.to_vec()),
        }
    }

    /// Drop transforms, close the socket, go `Offline`. Idempotent.
    pub async fn terminate(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
            let _ = task.await;
        }
        self.transforms = None;
        self.transport.close().await;
        if self.state != ChannelState::Offline {
            self.set_state(ChannelState::Offline);
        }
    }

    fn set_state(&mut self, next: ChannelState) {
        tracing::debug!(from = ?self.state, to = ?next, "channel state");
        self.state = next;
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}
