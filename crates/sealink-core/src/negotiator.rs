//! Handshake state machine negotiating per-direction transform parameters.
//!
//! ```text
//! Client                                   Server
//!   |  '1' encoder public key                 |
//!   |  '2' encoder personalization            |
//!   |  '3' decoder public key                 |
//!   |  '4' decoder personalization ---------> |
//!   | <---------------------------- 'A' ACK   |
//!   | <-------------- '1' encoder public key  |
//!   | <-------------- '2' encoder nonce       |
//!   | <-------------- '3' decoder public key  |
//!   | <-------------- '4' decoder nonce       |
//!   |  'A' ACK -----------------------------> |
//! ```
//!
//! Tags name the *sender's* direction. A received `'1'`/`'2'` therefore feeds
//! the local decoder and a received `'3'`/`'4'` feeds the local encoder, on
//! both roles. The personalization of a direction is chosen by the client and
//! its nonce by the server.
//!
//! The negotiator is sans-I/O: it consumes frame bodies and returns the frames
//! the caller must write next.

use core::fmt;

use crate::frame::{OutboundFrame, Tag, TaggedFrame};
use crate::{Error, Result};
use sealink_crypto::kex::EcdhP256KeyPair;
use sealink_crypto::transform::{random_nonce, random_personalization};
use sealink_crypto::TransformParams;
use zeroize::Zeroizing;

/// Number of peer values needed before secrets can be derived.
pub const PEER_VALUE_COUNT: usize = 4;

/// Handshake role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends its parameters first.
    Client,
    /// Answers with ACK and its own parameters.
    Server,
}

/// Handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing started.
    Idle,
    /// Local key pairs and parameters exist.
    KeysGenerated,
    /// Client: the four parameter frames were handed out for sending.
    ParamsSent,
    /// Waiting for `'A'`/`"ACK"`.
    AwaitingAck,
    /// Collecting the four peer values.
    ReceivingPeerParams,
    /// Both directions derived; secrets can be taken.
    SecretsDerived,
    /// Aborted. Terminal.
    Failed,
}

/// What the caller must do after [`Negotiator::handle_frame`].
#[derive(Debug)]
pub enum Step {
    /// Read the next frame.
    Continue,
    /// Write these frames in order, then read the next frame.
    Reply(Vec<OutboundFrame>),
    /// The handshake is done. Write these frames once the transforms are
    /// instantiated; the client's final ACK tells the server it may proceed.
    Complete(Vec<OutboundFrame>),
}

/// Transform parameters for both local directions.
#[derive(Debug)]
pub struct NegotiatedSecrets {
    /// Parameters for the local encoder.
    pub encoder: TransformParams,
    /// Parameters for the local decoder.
    pub decoder: TransformParams,
}

/// One direction's handshake material.
///
/// `local_param` is the personalization on the client and the nonce on the
/// server; `peer_param` is the other one.
#[derive(Default)]
struct DirectionBundle {
    key_pair: Option<EcdhP256KeyPair>,
    local_param: Option<Zeroizing<Vec<u8>>>,
    peer_public: Option<Zeroizing<Vec<u8>>>,
    peer_param: Option<Zeroizing<Vec<u8>>>,
}

impl DirectionBundle {
    fn generate(role: Role) -> Result<Self> {
        let local_param = match role {
            Role::Client => {
                let personalization = random_personalization();
                Zeroizing::new(personalization.as_bytes().to_vec())
            }
            Role::Server => random_nonce(),
        };
        Ok(Self {
            key_pair: Some(EcdhP256KeyPair::generate()?),
            local_param: Some(local_param),
            peer_public: None,
            peer_param: None,
        })
    }

    fn public_key(&self) -> Result<&[u8]> {
        self.key_pair
            .as_ref()
            .map(EcdhP256KeyPair::public_key)
            .ok_or_else(|| Error::InvalidState("key pair already consumed".into()))
    }

    fn local_param(&self) -> Result<&[u8]> {
        self.local_param
            .as_deref()
            .map(Vec::as_slice)
            .ok_or_else(|| Error::InvalidState("local parameter already consumed".into()))
    }

    /// Consume everything and produce the transform parameters.
    fn derive(&mut self, role: Role) -> Result<TransformParams> {
        let missing = || Error::InvalidState("direction bundle incomplete".into());
        let key_pair = self.key_pair.take().ok_or_else(missing)?;
        let peer_public = self.peer_public.take().ok_or_else(missing)?;
        let local_param = self.local_param.take().ok_or_else(missing)?;
        let peer_param = self.peer_param.take().ok_or_else(missing)?;

        let shared = key_pair.agree(peer_public)?;
        let secret = Zeroizing::new(shared.to_vec());

        let (personalization, nonce) = match role {
            Role::Client => (local_param, peer_param),
            Role::Server => (peer_param, local_param),
        };
        let personalization = String::from_utf8(personalization.to_vec()).map_err(|_| {
            Error::ProtocolViolation("personalization is not valid UTF-8".into())
        })?;

        Ok(TransformParams::new(
            secret,
            nonce,
            Zeroizing::new(personalization),
        ))
    }

    fn wipe(&mut self) {
        *self = Self::default();
    }
}

/// ECDH handshake driver for one session.
pub struct Negotiator {
    role: Role,
    state: HandshakeState,
    encoder: DirectionBundle,
    decoder: DirectionBundle,
    values_received: usize,
    secrets: Option<NegotiatedSecrets>,
}

impl Negotiator {
    /// New negotiator in [`HandshakeState::Idle`].
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: HandshakeState::Idle,
            encoder: DirectionBundle::default(),
            decoder: DirectionBundle::default(),
            values_received: 0,
            secrets: None,
        }
    }

    /// Role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Distinct peer values stored so far (0..=4).
    pub fn values_received(&self) -> usize {
        self.values_received
    }

    /// Whether secrets have been derived.
    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::SecretsDerived
    }

    /// Generate local material.
    ///
    /// The client gets its four parameter frames back (`'1'`..`'4'`) and moves
    /// to [`HandshakeState::ParamsSent`]; the caller writes them and then calls
    /// [`Negotiator::await_ack`]. The server returns no frames and starts
    /// collecting peer values.
    pub fn start(&mut self) -> Result<Vec<OutboundFrame>> {
        self.expect_state(HandshakeState::Idle, "start")?;

        let role = self.role;
        let generated = DirectionBundle::generate(role)
            .and_then(|encoder| DirectionBundle::generate(role).map(|decoder| (encoder, decoder)));
        let (encoder, decoder) = match generated {
            Ok(bundles) => bundles,
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };
        self.encoder = encoder;
        self.decoder = decoder;
        self.transition(HandshakeState::KeysGenerated);

        match self.role {
            Role::Client => {
                let frames = self.local_param_frames()?;
                self.transition(HandshakeState::ParamsSent);
                Ok(frames)
            }
            Role::Server => {
                self.transition(HandshakeState::ReceivingPeerParams);
                Ok(Vec::new())
            }
        }
    }

    /// Client: the parameter frames are written, wait for the ACK.
    pub fn await_ack(&mut self) -> Result<()> {
        self.expect_state(HandshakeState::ParamsSent, "await_ack")?;
        self.transition(HandshakeState::AwaitingAck);
        Ok(())
    }

    /// Feed one received frame body (tag retained as first byte).
    ///
    /// # Errors
    ///
    /// Any protocol or crypto failure moves the negotiator to
    /// [`HandshakeState::Failed`] and wipes all material. The handshake is not
    /// retried.
    pub fn handle_frame(&mut self, body: &[u8]) -> Result<Step> {
        let result = self.dispatch(body);
        if result.is_err() && self.state != HandshakeState::Failed {
            self.fail();
        }
        result
    }

    /// Take the negotiated parameters. Available once, after completion.
    pub fn take_secrets(&mut self) -> Result<NegotiatedSecrets> {
        self.expect_state(HandshakeState::SecretsDerived, "take_secrets")?;
        self.secrets
            .take()
            .ok_or_else(|| Error::InvalidState("secrets already taken".into()))
    }

    /// Abort and wipe everything.
    pub fn fail(&mut self) {
        self.encoder.wipe();
        self.decoder.wipe();
        self.secrets = None;
        self.transition(HandshakeState::Failed);
    }

    fn dispatch(&mut self, body: &[u8]) -> Result<Step> {
        let frame = TaggedFrame::parse(body)?;

        match self.state {
            HandshakeState::AwaitingAck => {
                if !frame.is_ack() {
                    return Err(Error::ProtocolViolation(format!(
                        "expected ACK, got tag 0x{:02x}",
                        frame.tag
                    )));
                }
                match self.role {
                    Role::Client => {
                        self.transition(HandshakeState::ReceivingPeerParams);
                        Ok(Step::Continue)
                    }
                    Role::Server => {
                        self.transition(HandshakeState::SecretsDerived);
                        Ok(Step::Complete(Vec::new()))
                    }
                }
            }
            HandshakeState::ReceivingPeerParams => self.store_peer_value(frame),
            state => Err(Error::InvalidState(format!(
                "no frame expected in state {:?}",
                state
            ))),
        }
    }

    fn store_peer_value(&mut self, frame: TaggedFrame<'_>) -> Result<Step> {
        let (bundle, is_public) = match frame.kind() {
            Some(Tag::EncoderPublicKey) => (&mut self.decoder, true),
            Some(Tag::EncoderParam) => (&mut self.decoder, false),
            Some(Tag::DecoderPublicKey) => (&mut self.encoder, true),
            Some(Tag::DecoderParam) => (&mut self.encoder, false),
            _ => {
                return Err(Error::ProtocolViolation(format!(
                    "unexpected tag 0x{:02x} during parameter exchange",
                    frame.tag
                )))
            }
        };
        let slot = if is_public {
            &mut bundle.peer_public
        } else {
            &mut bundle.peer_param
        };

        // A repeated tag overwrites the stored value but is counted once.
        if slot.is_none() {
            self.values_received += 1;
        } else {
            tracing::warn!(tag = frame.tag, "duplicate handshake value, overwriting");
        }
        *slot = Some(Zeroizing::new(frame.payload.to_vec()));

        if self.values_received < PEER_VALUE_COUNT {
            return Ok(Step::Continue);
        }

        match self.role {
            Role::Client => {
                self.derive_secrets()?;
                self.transition(HandshakeState::SecretsDerived);
                Ok(Step::Complete(vec![OutboundFrame::ack()]))
            }
            Role::Server => {
                let mut frames = vec![OutboundFrame::ack()];
                frames.extend(self.local_param_frames()?);
                self.derive_secrets()?;
                self.transition(HandshakeState::AwaitingAck);
                Ok(Step::Reply(frames))
            }
        }
    }

    fn derive_secrets(&mut self) -> Result<()> {
        let encoder = self.encoder.derive(self.role)?;
        let decoder = self.decoder.derive(self.role)?;
        self.secrets = Some(NegotiatedSecrets { encoder, decoder });
        Ok(())
    }

    fn local_param_frames(&self) -> Result<Vec<OutboundFrame>> {
        Ok(vec![
            OutboundFrame::new(Tag::EncoderPublicKey, self.encoder.public_key()?),
            OutboundFrame::new(Tag::EncoderParam, self.encoder.local_param()?),
            OutboundFrame::new(Tag::DecoderPublicKey, self.decoder.public_key()?),
            OutboundFrame::new(Tag::DecoderParam, self.decoder.local_param()?),
        ])
    }

    fn expect_state(&self, expected: HandshakeState, op: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "{} requires {:?}, current state is {:?}",
                op, expected, self.state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: HandshakeState) {
        tracing::debug!(role = ?self.role, from = ?self.state, to = ?next, "handshake transition");
        self.state = next;
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("values_received", &self.values_received)
            .finish_non_exhaustive()
    }
}
