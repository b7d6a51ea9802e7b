//! Server endpoint.
//!
//! [`SecureServer`] accepts connections and runs the responder side of
//! session setup; each accepted connection becomes a [`ServerSession`] that
//! answers one reply per request.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::session::{establish, TransformSession};
use crate::tcp::{FramedListener, FramedTransport};
use crate::{Error, Result};
use sealink_core::frame::{Tag, ERR_BODY};
use sealink_core::{Role, TaggedFrame};
use sealink_crypto::{AeadProvider, TransformProvider};
use zeroize::Zeroizing;

/// Listening server.
pub struct SecureServer {
    listener: FramedListener,
    config: ServerConfig,
    provider: Arc<dyn TransformProvider>,
}

impl SecureServer {
    /// Bind with the bundled [`AeadProvider`].
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_provider(config, Arc::new(AeadProvider::new())).await
    }

    /// Bind with a custom transform provider.
    ///
    /// The provider is initialized before the socket is bound.
    pub async fn bind_with_provider(
        config: ServerConfig,
        provider: Arc<dyn TransformProvider>,
    ) -> Result<Self> {
        if config.security.has_transform() {
            provider.initialize().map_err(Error::Crypto)?;
        }
        let listener = FramedListener::bind(&config.bind_address, config.limits()).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            provider = provider.name(),
            "server listening"
        );
        Ok(Self {
            listener,
            config,
            provider,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection and run setup on it.
    ///
    /// # Errors
    ///
    /// Setup failures close that connection and are returned; the listener
    /// stays usable.
    pub async fn accept(&self) -> Result<ServerSession> {
        let (transport, peer) = self.listener.accept().await?;
        tracing::info!(%peer, "connection accepted");

        match establish(
            &transport,
            Role::Server,
            &self.config.security,
            self.provider.as_ref(),
        )
        .await
        {
            Ok(transforms) => Ok(ServerSession {
                transport,
                transforms,
                tagged: self.config.security.is_tagged(),
                peer,
            }),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }
}

/// One established connection on the server side.
pub struct ServerSession {
    transport: FramedTransport,
    transforms: Option<TransformSession>,
    tagged: bool,
    peer: SocketAddr,
}

impl ServerSession {
    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether a transform is active.
    pub fn is_secured(&self) -> bool {
        self.transforms.is_some()
    }

    /// Receive and decode one request.
    ///
    /// # Errors
    ///
    /// `Transform` if only this message is bad; anything else ends the
    /// session.
    pub async fn recv_message(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let body = self.transport.receive().await?;
        let payload = if self.tagged {
            let frame = TaggedFrame::parse(&body)?;
            if frame.kind() != Some(Tag::Message) {
                return Err(sealink_core::Error::ProtocolViolation(format!(
                    "expected message tag, got 0x{:02x}",
                    frame.tag
                ))
                .into());
            }
            frame.payload
        } else {
            &body[..]
        };

        match self.transforms.as_mut() {
            Some(transforms) => transforms.decode(payload),
            None => Ok(Zeroizing::new(payload.to_vec())),
        }
    }

    /// Encode and send one reply.
    pub async fn send_message(&mut self, plaintext: &[u8]) -> Result<()> {
        let payload = match self.transforms.as_mut() {
            Some(transforms) => transforms.encode(plaintext)?,
            None => plaintext.to_vec(),
        };
        let tag = self.tagged.then(|| Tag::Message.to_u8());
        self.transport.send(tag, &payload).await
    }

    /// Tell the client its last message could not be processed.
    ///
    /// Tagged channels get an `'E'` frame; untagged ones an untransformed
    /// `"ERR"` body that fails to decode on the client.
    pub async fn send_error(&mut self) -> Result<()> {
        let tag = self.tagged.then(|| Tag::Error.to_u8());
        self.transport.send(tag, ERR_BODY).await
    }

    /// Answer every request with `handler(request)` until the client leaves.
    ///
    /// Requests that fail to decode get [`ServerSession::send_error`] and
    /// serving continues.
    pub async fn serve<F>(mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Vec<u8>,
    {
        loop {
            match self.recv_message().await {
                Ok(request) => {
                    let reply = handler(&request);
                    self.send_message(&reply).await?;
                }
                Err(Error::ConnectionClosed) => {
                    tracing::info!(peer = %self.peer, "client disconnected");
                    self.close().await;
                    return Ok(());
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(peer = %self.peer, error = %e, "request failed to decode");
                    self.send_error().await?;
                }
                Err(e) => {
                    self.close().await;
                    return Err(e);
                }
            }
        }
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}
