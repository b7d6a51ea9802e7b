//! Session setup shared by the client channel and the server.
//!
//! [`establish`] runs whatever the security mode needs after the socket is
//! open: nothing for `Plain`, fixed parameters for `PreShared`, the ECDH
//! handshake for `Negotiated`. The result is an optional
//! [`TransformSession`].

use core::fmt;

use crate::config::SecurityMode;
use crate::tcp::FramedTransport;
use crate::{Error, Result};
use sealink_core::frame::Tag;
use sealink_core::{NegotiatedSecrets, Negotiator, OutboundFrame, Role, Step, TaggedFrame};
use sealink_crypto::{Decoder, Encoder, TransformParams, TransformProvider};
use zeroize::Zeroizing;

/// Instantiated encoder/decoder pair of one endpoint.
pub struct TransformSession {
    encoder: Box<dyn Encoder>,
    decoder: Box<dyn Decoder>,
}

impl TransformSession {
    /// Instantiate both directions. The parameters are wiped on return.
    pub fn instantiate(
        provider: &dyn TransformProvider,
        encoder: TransformParams,
        decoder: TransformParams,
    ) -> Result<Self> {
        let encoder = provider.encoder(encoder).map_err(Error::Crypto)?;
        let decoder = provider.decoder(decoder).map_err(Error::Crypto)?;
        Ok(Self { encoder, decoder })
    }

    /// Encode an outbound message.
    pub fn encode(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encoder.encode(plaintext).map_err(Error::Transform)
    }

    /// Decode an inbound message.
    pub fn decode(&mut self, encoded: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.decoder.decode(encoded).map_err(Error::Transform)
    }
}

impl fmt::Debug for TransformSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformSession { .. }")
    }
}

/// Bring an open transport to the ready state for `security`.
pub async fn establish(
    transport: &FramedTransport,
    role: Role,
    security: &SecurityMode,
    provider: &dyn TransformProvider,
) -> Result<Option<TransformSession>> {
    match security {
        SecurityMode::Plain => Ok(None),
        SecurityMode::PreShared(secrets) => {
            tracing::warn!(
                ?role,
                "using pre-shared demo secrets; this channel is not confidential"
            );
            let (encoder, decoder) = secrets.params(role);
            TransformSession::instantiate(provider, encoder, decoder).map(Some)
        }
        SecurityMode::Negotiated => {
            let Negotiated {
                secrets,
                confirmation,
            } = negotiate(transport, role).await?;
            // The peer only hears the final ACK once both transforms exist.
            let transforms =
                TransformSession::instantiate(provider, secrets.encoder, secrets.decoder)?;
            if !confirmation.is_empty() {
                transport.send_frames(&confirmation).await?;
                tracing::debug!(?role, "final acknowledgment sent");
            }
            Ok(Some(transforms))
        }
    }
}

/// Result of [`negotiate`].
pub struct Negotiated {
    /// Parameters for both transform directions.
    pub secrets: NegotiatedSecrets,
    /// Frames still owed to the peer once the transforms are instantiated.
    /// Empty for the server.
    pub confirmation: Vec<OutboundFrame>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("confirmation", &self.confirmation.len())
            .finish_non_exhaustive()
    }
}

/// Run the ECDH handshake over `transport`.
///
/// The client's final ACK is not written; it is returned in
/// [`Negotiated::confirmation`] for the caller to send after instantiation.
/// On any failure the negotiator is wiped and the error returned; nothing is
/// retried.
pub async fn negotiate(transport: &FramedTransport, role: Role) -> Result<Negotiated> {
    let mut negotiator = Negotiator::new(role);
    match drive(transport, &mut negotiator).await {
        Ok(confirmation) => {
            tracing::info!(?role, "handshake complete");
            Ok(Negotiated {
                secrets: negotiator.take_secrets()?,
                confirmation,
            })
        }
        Err(e) => {
            negotiator.fail();
            tracing::warn!(?role, error = %e, "handshake failed");
            if role == Role::Server && matches!(e, Error::Protocol(_)) {
                // Best effort; the peer may already be gone.
                let _ = transport
                    .send(Some(Tag::Error.to_u8()), sealink_core::frame::ERR_BODY)
                    .await;
            }
            Err(e)
        }
    }
}

async fn drive(
    transport: &FramedTransport,
    negotiator: &mut Negotiator,
) -> Result<Vec<OutboundFrame>> {
    let params = negotiator.start()?;
    if !params.is_empty() {
        transport.send_frames(&params).await?;
        negotiator.await_ack()?;
    }

    loop {
        let body = transport.receive().await?;
        if let Ok(frame) = TaggedFrame::parse(&body) {
            tracing::trace!(tag = frame.tag, len = frame.payload.len(), "handshake frame");
        }
        match negotiator.handle_frame(&body)? {
            Step::Continue => {}
            Step::Reply(frames) => transport.send_frames(&frames).await?,
            Step::Complete(frames) => return Ok(frames),
        }
    }
}
