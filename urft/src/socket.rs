//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that owns
//! only byte I/O: bounded receive polls, sends, and mapping of OS errors to
//! [`SocketError`].  Decoding is left to the engines because an undecodable
//! (or empty) datagram is still meaningful to them.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer's port is closed (ICMP port unreachable).
    #[error("connection refused by peer")]
    ConnectionRefused,
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for SocketError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            _ => Self::Io(e),
        }
    }
}

// ---------------------------------------------------------------------------
// DatagramSink
// ---------------------------------------------------------------------------

/// Anything that can emit one datagram to an address.
///
/// The ack batcher is written against this seam so its failure handling can
/// be exercised without a network.
pub trait DatagramSink {
    fn send_datagram(
        &self,
        bytes: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), SocketError>> + Send;
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    /// Receive buffer size; longer datagrams are truncated by the OS.
    max_datagram: usize,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, max_datagram: usize) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            max_datagram,
        })
    }

    /// Fix the default destination and filter inbound datagrams to `peer`.
    ///
    /// On a connected socket the OS reports ICMP port-unreachable back to
    /// us, which surfaces as [`SocketError::ConnectionRefused`].
    pub async fn connect(&self, peer: SocketAddr) -> Result<(), SocketError> {
        self.inner.connect(peer).await?;
        Ok(())
    }

    /// Send `bytes` to the connected peer.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SocketError> {
        self.inner.send(bytes).await?;
        Ok(())
    }

    /// Send `bytes` as a single datagram to `dest`.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Wait up to `wait` for the next datagram.
    ///
    /// Returns `Ok(None)` when the wait elapses with nothing to read.
    /// Zero-length datagrams are returned as empty vectors.
    pub async fn recv_timeout(
        &self,
        wait: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, SocketError> {
        let mut buf = vec![0u8; self.max_datagram];
        match tokio::time::timeout(wait, self.inner.recv_from(&mut buf)).await {
            Ok(Ok((n, addr))) => {
                buf.truncate(n);
                Ok(Some((buf, addr)))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Ok(None),
        }
    }
}

impl DatagramSink for Socket {
    async fn send_datagram(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.send_to(bytes, dest).await
    }
}
