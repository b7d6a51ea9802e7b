//! Length-prefixed framing over TCP.
//!
//! [`FramedTransport`] owns one TCP stream split into halves. The write half
//! sits behind the Transmission Lock: a frame is written completely, prefix
//! and body, before another sender can start. The read half has its own lock
//! so a read waiting for data never blocks a write. Inbound bytes go through
//! a [`FrameDecoder`], which keeps whatever arrived past the current frame.
//!
//! The transport is cheap to clone; clones share the same stream.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::TransportLimits;
use crate::{Error, Result};
use sealink_core::frame::{encode_frame, FrameDecoder, OutboundFrame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;

const READ_CHUNK: usize = 8 * 1024;

/// Read half and the bytes buffered from it.
struct FrameReader {
    stream: OwnedReadHalf,
    decoder: FrameDecoder,
}

impl FrameReader {
    fn new(stream: OwnedReadHalf, limits: &TransportLimits) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::with_max_len(limits.max_frame_len),
        }
    }
}

/// A TCP stream carrying length-prefixed frames.
#[derive(Clone)]
pub struct FramedTransport {
    reader: Arc<Mutex<Option<FrameReader>>>,
    /// Transmission Lock.
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    limits: TransportLimits,
}

impl FramedTransport {
    /// Create an unopened transport.
    pub fn new(limits: TransportLimits) -> Self {
        Self {
            reader: Arc::new(Mutex::new(None)),
            writer: Arc::new(Mutex::new(None)),
            limits,
        }
    }

    /// Wrap an accepted stream.
    pub fn from_stream(stream: TcpStream, limits: TransportLimits) -> Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(Some(FrameReader::new(reader, &limits)))),
            writer: Arc::new(Mutex::new(Some(writer))),
            limits,
        })
    }

    /// Limits in effect.
    pub fn limits(&self) -> TransportLimits {
        self.limits
    }

    /// Connect to `host:port`.
    ///
    /// # Errors
    ///
    /// `Connect` if the socket cannot be opened (the transport stays closed),
    /// `InvalidState` if it is already open.
    pub async fn open(&self, host: &str, port: u16) -> Result<()> {
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;
        if writer.is_some() {
            return Err(Error::InvalidState("transport already open".into()));
        }

        let connect = TcpStream::connect((host, port));
        let stream = match self.limits.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                Error::Connect(format!("{}:{}: timed out after {:?}", host, port, limit))
            })?,
            None => connect.await,
        }
        .map_err(|e| Error::Connect(format!("{}:{}: {}", host, port, e)))?;

        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        *reader = Some(FrameReader::new(read_half, &self.limits));
        *writer = Some(write_half);

        tracing::debug!(host, port, "transport opened");
        Ok(())
    }

    /// Whether a stream is attached.
    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Remote address, if open.
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        self.writer
            .lock()
            .await
            .as_ref()
            .and_then(|w| w.peer_addr().ok())
    }

    /// Write one frame, tagged when `tag` is given.
    pub async fn send(&self, tag: Option<u8>, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(tag, payload)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        write_all(writer, &frame).await
    }

    /// Write several tagged frames back to back under one lock acquisition.
    pub async fn send_frames(&self, frames: &[OutboundFrame]) -> Result<()> {
        let mut buffer = Vec::new();
        for frame in frames {
            buffer.extend(frame.encode()?);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        write_all(writer, &buffer).await
    }

    /// Read one frame body. A tag, if any, is kept as the first byte.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` on end of stream or receive timeout.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        let read = read_frame(&mut reader.stream, &mut reader.decoder);
        match self.limits.receive_timeout {
            Some(limit) => timeout(limit, read)
                .await
                .map_err(|_| Error::ConnectionClosed)?,
            None => read.await,
        }
    }

    /// Release the stream. Idempotent; the transport can be reopened.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
            tracing::debug!("transport closed");
        }
        self.reader.lock().await.take();
    }
}

async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read until `decoder` yields one `| u32 length | body |` frame body.
///
/// An oversized prefix fails before its body is read. Bytes are pushed only
/// after a read completes, so a cancelled call loses nothing.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
) -> Result<Vec<u8>> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(body) = decoder.decode()? {
            return Ok(body);
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        decoder.push(&chunk[..n]);
    }
}

/// Listening side producing [`FramedTransport`]s.
pub struct FramedListener {
    listener: TcpListener,
    limits: TransportLimits,
}

impl FramedListener {
    /// Bind to `addr` (e.g. `"127.0.0.1:0"`).
    pub async fn bind(addr: &str, limits: TransportLimits) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Connect(format!("bind {} failed: {}", addr, e)))?;
        Ok(Self { listener, limits })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(FramedTransport, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((FramedTransport::from_stream(stream, self.limits)?, peer))
    }
}
