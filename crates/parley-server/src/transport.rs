//! Connection transport for the server loop.
//!
//! The loop never blocks on I/O, so the transport is expressed as two polling
//! traits: [`Listener::poll_accept`] reports whether a client is waiting, and
//! [`Connection::try_read`] reports whether a complete message has arrived.
//! Writes are queued and flushed opportunistically; they never wait on a slow
//! peer.
//!
//! [`TcpTransport`] is the production implementation over non-blocking
//! `std::net` sockets. The simulation harness provides an in-memory one.

use std::{
    io::{self, Write},
    net::{SocketAddr, TcpListener, TcpStream},
};

use bytes::{Buf, Bytes, BytesMut};
use parley_proto::{FrameDecoder, ProtocolError, encode_frame};
use thiserror::Error;

use crate::error::ServerError;

/// Fatal transport failure on a single connection.
///
/// Every variant means the connection is unusable. The server loop isolates
/// the failure to the one session and reclaims it at the end of the pass.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// Socket-level failure (reset, broken pipe, ...).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent bytes that cannot be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer is not draining its socket and the outbound queue overflowed.
    #[error("outbound backlog of {pending} bytes exceeds limit of {limit}")]
    Backpressure {
        /// Bytes waiting to be written
        pending: usize,
        /// Configured limit
        limit: usize,
    },
}

/// One client connection carrying length-delimited text messages.
pub trait Connection {
    /// Read the next complete message without blocking.
    ///
    /// Returns `Ok(None)` when no complete message is available yet.
    fn try_read(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Queue one message for delivery and push out as much as the peer will
    /// accept right now.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Push out previously queued bytes.
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Human-readable peer identity for logs.
    fn peer(&self) -> String;
}

/// Source of new connections.
pub trait Listener {
    /// Connection type produced by this listener.
    type Connection: Connection;

    /// Accept one pending connection without blocking.
    ///
    /// Returns `Ok(None)` when nobody is waiting.
    fn poll_accept(&mut self) -> Result<Option<Self::Connection>, TransportError>;
}

/// Non-blocking TCP listener.
pub struct TcpTransport {
    listener: TcpListener,
    max_outbound_bytes: usize,
}

impl TcpTransport {
    /// Bind a non-blocking listener on `address`.
    ///
    /// `max_outbound_bytes` bounds each accepted connection's unsent backlog.
    pub fn bind(address: &str, max_outbound_bytes: usize) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;
        listener.set_nonblocking(true)?;

        tracing::info!("TCP transport bound to {}", listener.local_addr()?);

        Ok(Self { listener, max_outbound_bytes })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

impl Listener for TcpTransport {
    type Connection = TcpConnection;

    fn poll_accept(&mut self) -> Result<Option<TcpConnection>, TransportError> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                Ok(Some(TcpConnection::new(stream, peer, self.max_outbound_bytes)))
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Non-blocking TCP connection with incremental framing in both directions.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    outbound: BytesMut,
    max_outbound_bytes: usize,
}

impl TcpConnection {
    fn new(stream: TcpStream, peer: SocketAddr, max_outbound_bytes: usize) -> Self {
        Self { stream, peer, decoder: FrameDecoder::new(), outbound: BytesMut::new(), max_outbound_bytes }
    }

    /// Bytes queued but not yet accepted by the socket.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }
}

impl Connection for TcpConnection {
    fn try_read(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(payload) = self.decoder.decode()? {
                return Ok(Some(payload));
            }

            match self.decoder.read_from(&mut self.stream) {
                Ok(0) => {
                    self.decoder.finish()?;
                    return Err(TransportError::Closed);
                },
                Ok(_) => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        encode_frame(payload, &mut self.outbound)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        if self.outbound.len() > self.max_outbound_bytes {
            return Err(TransportError::Backpressure {
                pending: self.outbound.len(),
                limit: self.max_outbound_bytes,
            });
        }

        Ok(())
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}
