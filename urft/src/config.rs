//! Protocol timing and sizing parameters.
//!
//! [`ProtocolConfig::default`] reproduces the wire constants both peers must
//! agree on.  Tests shrink the timings through the `with_*` setters so a
//! loss-recovery scenario runs in milliseconds instead of seconds.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::packet::{HEADER_SIZE, INIT_HEADER_SIZE, MAX_SEGMENT_SIZE};

/// Resend deadline for an unacknowledged INIT or DATA segment.
pub const LOSS_TIMEOUT: Duration = Duration::from_secs(3);

/// Poll interval, and the delay used to batch acknowledgements.
pub const CONSECUTIVE_PACKETS_TIMEOUT: Duration = Duration::from_secs(1);

/// Consecutive empty datagrams tolerated before the receiver closes.
pub const CONNECTION_END_NULLS_COUNT: usize = 10;

/// Upper bound on ACK datagrams emitted by a single flush.
pub const MAX_ACK_PER_BATCH: usize = 200;

/// Default UDP port of the receiver.
pub const DEFAULT_PORT: u16 = 12345;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("segment size {0} leaves no room for payload")]
    SegmentTooSmall(usize),
    #[error("segment size {0} exceeds the UDP datagram limit")]
    SegmentTooLarge(usize),
    #[error("max_ack_per_batch must be at least 1")]
    EmptyBatch,
    #[error("{0} must be non-zero")]
    ZeroTimeout(&'static str),
}

/// Adjustable protocol parameters shared by both engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Largest datagram sent or received.
    pub max_segment_size: usize,
    /// How long a segment may stay unacknowledged before it is resent.
    pub loss_timeout: Duration,
    /// Bounded wait of each socket poll; also the ack batching delay.
    pub consecutive_packets_timeout: Duration,
    /// Silence from the peer after which the transfer fails.
    pub socket_timeout: Duration,
    /// Empty datagrams tolerated before the receiver treats the peer as gone.
    pub connection_end_nulls_count: usize,
    /// Cap on acknowledgements emitted per flush.
    pub max_ack_per_batch: usize,
    /// How long a finished receiver keeps re-acknowledging duplicates.
    pub exit_delay: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_segment_size: MAX_SEGMENT_SIZE,
            loss_timeout: LOSS_TIMEOUT,
            consecutive_packets_timeout: CONSECUTIVE_PACKETS_TIMEOUT,
            socket_timeout: LOSS_TIMEOUT * 3 / 2,
            connection_end_nulls_count: CONNECTION_END_NULLS_COUNT,
            max_ack_per_batch: MAX_ACK_PER_BATCH,
            exit_delay: LOSS_TIMEOUT + CONSECUTIVE_PACKETS_TIMEOUT,
        }
    }
}

impl ProtocolConfig {
    /// Largest DATA payload at the configured segment size.
    pub fn max_payload_size(&self) -> usize {
        self.max_segment_size.saturating_sub(HEADER_SIZE)
    }

    /// Longest filename an INIT segment can carry.
    pub fn max_filename_len(&self) -> usize {
        self.max_segment_size.saturating_sub(INIT_HEADER_SIZE)
    }

    /// Set the loss timeout, rescaling the socket timeout and exit delay
    /// the way the defaults derive them.
    pub fn with_loss_timeout(mut self, loss_timeout: Duration) -> Self {
        self.loss_timeout = loss_timeout;
        self.socket_timeout = loss_timeout * 3 / 2;
        self.exit_delay = loss_timeout + self.consecutive_packets_timeout;
        self
    }

    pub fn with_consecutive_packets_timeout(mut self, timeout: Duration) -> Self {
        self.consecutive_packets_timeout = timeout;
        self.exit_delay = self.loss_timeout + timeout;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn with_max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn with_max_ack_per_batch(mut self, max: usize) -> Self {
        self.max_ack_per_batch = max;
        self
    }

    pub fn with_connection_end_nulls_count(mut self, count: usize) -> Self {
        self.connection_end_nulls_count = count;
        self
    }

    pub fn with_exit_delay(mut self, delay: Duration) -> Self {
        self.exit_delay = delay;
        self
    }

    /// Reject parameter combinations the engines cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_segment_size <= HEADER_SIZE {
            return Err(ConfigError::SegmentTooSmall(self.max_segment_size));
        }
        if self.max_segment_size > u16::MAX as usize {
            return Err(ConfigError::SegmentTooLarge(self.max_segment_size));
        }
        if self.max_ack_per_batch == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        for (name, value) in [
            ("loss_timeout", self.loss_timeout),
            ("consecutive_packets_timeout", self.consecutive_packets_timeout),
            ("socket_timeout", self.socket_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }
}

/// Receiver-only settings.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Directory the announced file is written into.
    pub output_dir: PathBuf,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}
