//! Fatal transfer errors.
//!
//! Only conditions that end a transfer are represented here.  Decode
//! failures, checksum mismatches and individual ACK send failures are
//! handled inside the engines and never reach the caller.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// No datagram from the peer within the socket timeout.
    #[error("timed out: no response from peer for {0:?}")]
    Timeout(Duration),
    /// The peer's port is closed.
    #[error("connection refused by peer")]
    ConnectionRefused,
    #[error("socket error: {0}")]
    Socket(io::Error),
    #[error("file error: {0}")]
    File(#[from] io::Error),
    /// Offsets are four bytes on the wire.
    #[error("file is {0} bytes; transfers are limited to 4 GiB - 1")]
    FileTooLarge(u64),
    #[error("{0:?} has no usable file name")]
    InvalidFilename(String),
    #[error("file name is {len} bytes; at most {max} fit in an INIT segment")]
    FilenameTooLong { len: usize, max: usize },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl TransferError {
    /// `true` for the conditions a CLI reports as a warning: the peer went
    /// silent or went away.
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionRefused)
    }
}

impl From<SocketError> for TransferError {
    fn from(e: SocketError) -> Self {
        match e {
            SocketError::ConnectionRefused => Self::ConnectionRefused,
            SocketError::Io(e) => Self::Socket(e),
        }
    }
}
