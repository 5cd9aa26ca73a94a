//! Sending side of a transfer.
//!
//! [`Sender`] owns a UDP socket connected to the receiver and drives one
//! file through the phases in [`SenderState`]:
//!
//! 1. **AWAIT_INIT_ACK**: send INIT (filesize + base name) and resend it
//!    every loss timeout until the receiver acknowledges
//!    [`INIT_SEQUENCE_NUMBER`].
//! 2. **STREAMING**: read the file once, front to back, sending every chunk
//!    as a DATA segment whose sequence number is its byte offset.  Nothing
//!    waits for ACKs here; each segment is entered into the
//!    [`RetransmitQueue`] with a deadline one loss timeout out.
//! 3. **DRAINING**: resend whatever has expired (re-reading the bytes at
//!    the segment's offset), then poll for ACKs until nothing is in flight.
//!
//! Because a sequence number *is* the file offset, an ACK names exactly the
//! byte range it covers and retransmission needs no side table.
//!
//! The socket timeout bounds every wait on the peer: if nothing at all
//! arrives for that long while an ACK is outstanding, the transfer fails
//! with [`TransferError::Timeout`].

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ProtocolConfig;
use crate::error::TransferError;
use crate::packet::{
    base_name, checksum, decode_ack, encode_data, encode_init, INIT_SEQUENCE_NUMBER,
};
use crate::retransmit::RetransmitQueue;
use crate::socket::Socket;
use crate::state::SenderState;
use crate::storage::SourceFile;

/// Summary of a completed send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub filename: String,
    pub filesize: u32,
    /// INIT datagrams sent, including resends.
    pub init_attempts: usize,
    /// DATA segments sent during the streaming pass.
    pub segments_sent: usize,
    /// DATA segments resent after their deadline expired.
    pub retransmissions: usize,
    /// ACKs that retired an in-flight segment.
    pub acks_received: usize,
}

/// One sending endpoint, good for one transfer.
#[derive(Debug)]
pub struct Sender {
    socket: Socket,
    peer: SocketAddr,
    config: ProtocolConfig,
    state: SenderState,
    inflight: RetransmitQueue,
    /// Last time any datagram arrived from the peer.
    last_heard: Instant,
    report: SendReport,
}

impl Sender {
    /// Bind an ephemeral socket and connect it to the receiver at `peer`.
    pub async fn connect(peer: SocketAddr, config: ProtocolConfig) -> Result<Self, TransferError> {
        config.validate()?;

        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = Socket::bind(local, config.max_segment_size).await?;
        socket.connect(peer).await?;
        log::debug!("[send] {} connected to {peer}", socket.local_addr);

        Ok(Self {
            socket,
            peer,
            config,
            state: SenderState::default(),
            inflight: RetransmitQueue::new(),
            last_heard: Instant::now(),
            report: SendReport::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Transfer the file at `path` and release the socket.
    pub async fn send_file(mut self, path: &Path) -> Result<SendReport, TransferError> {
        let mut file = SourceFile::open(path).await?;
        let filesize =
            u32::try_from(file.len()).map_err(|_| TransferError::FileTooLarge(file.len()))?;
        let filename = self.announced_name(path)?;

        log::info!("[send] filename {filename}");
        log::info!("[send] size {filesize} bytes, sending to {}", self.peer);
        self.report.filename = filename.clone();
        self.report.filesize = filesize;

        self.await_init_ack(filesize, &filename).await?;
        self.stream(&mut file).await?;
        self.drain(&mut file).await?;

        self.enter(SenderState::Done);
        log::info!(
            "[send] {filename} sent: {} segment(s), {} retransmission(s)",
            self.report.segments_sent,
            self.report.retransmissions
        );
        Ok(self.report)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn await_init_ack(&mut self, filesize: u32, filename: &str) -> Result<(), TransferError> {
        let init = encode_init(filesize, filename);
        let mut resend_at: Option<Instant> = None;
        self.last_heard = Instant::now();

        loop {
            let now = Instant::now();
            if resend_at.map_or(true, |at| now >= at) {
                self.socket.send(&init).await?;
                self.report.init_attempts += 1;
                resend_at = Some(now + self.config.loss_timeout);
                log::debug!("[send] → INIT (attempt {})", self.report.init_attempts);
            }

            let Some(datagram) = self.poll(self.config.consecutive_packets_timeout).await? else {
                continue;
            };
            match decode_ack(&datagram) {
                Ok(INIT_SEQUENCE_NUMBER) => {
                    log::debug!("[send] ← ACK INIT");
                    return Ok(());
                }
                Ok(seq) => log::trace!("[send] ignoring ACK {seq} before handshake"),
                Err(e) => log::trace!("[send] ignoring datagram: {e}"),
            }
        }
    }

    async fn stream(&mut self, file: &mut SourceFile) -> Result<(), TransferError> {
        self.enter(SenderState::Streaming);
        let max_payload = self.config.max_payload_size();

        while let Some((offset, payload)) = file.read_next(max_payload).await? {
            // Offsets fit: the file length was checked against u32 up front.
            let seq = offset as u32;
            self.send_data(seq, &payload).await?;
            self.report.segments_sent += 1;
        }
        Ok(())
    }

    async fn drain(&mut self, file: &mut SourceFile) -> Result<(), TransferError> {
        self.enter(SenderState::Draining);
        let max_payload = self.config.max_payload_size();
        // Streaming never polls; silence is measured from here.
        self.last_heard = Instant::now();

        while !self.inflight.is_empty() {
            let now = Instant::now();
            while let Some(expired) = self.inflight.pop_expired(now) {
                let payload = file.read_at(u64::from(expired.seq), max_payload).await?;
                log::info!("[send] resending {}", expired.seq);
                self.send_data(expired.seq, &payload).await?;
                self.report.retransmissions += 1;
            }

            let wait = self
                .inflight
                .next_deadline()
                .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
                .min(self.config.consecutive_packets_timeout);
            if let Some(datagram) = self.poll(wait).await? {
                self.on_ack_datagram(&datagram);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn send_data(&mut self, seq: u32, payload: &[u8]) -> Result<(), TransferError> {
        let crc = checksum(payload);
        self.socket.send(&encode_data(seq, crc, payload)).await?;
        self.inflight.push(seq, Instant::now() + self.config.loss_timeout);
        log::debug!(
            "[send] → DATA seq={seq} len={} crc={crc:#010x} in_flight={}",
            payload.len(),
            self.inflight.len()
        );
        Ok(())
    }

    fn on_ack_datagram(&mut self, datagram: &[u8]) {
        match decode_ack(datagram) {
            Ok(seq) if self.inflight.remove(seq) => {
                self.report.acks_received += 1;
                log::debug!(
                    "[send] ← ACK {seq}, {} still in flight",
                    self.inflight.len()
                );
            }
            Ok(seq) => log::trace!("[send] ← ACK {seq} (not in flight)"),
            Err(e) => log::trace!("[send] ignoring datagram: {e}"),
        }
    }

    /// Wait up to `wait` for a datagram from the peer.
    ///
    /// Fails once the peer has been silent for the socket timeout.
    async fn poll(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransferError> {
        if let Some((datagram, _)) = self.socket.recv_timeout(wait).await? {
            self.last_heard = Instant::now();
            return Ok(Some(datagram));
        }
        if self.last_heard.elapsed() >= self.config.socket_timeout {
            log::warn!(
                "[send] no response from {} for {:?} in {}",
                self.peer,
                self.config.socket_timeout,
                self.state
            );
            return Err(TransferError::Timeout(self.config.socket_timeout));
        }
        Ok(None)
    }

    fn announced_name(&self, path: &Path) -> Result<String, TransferError> {
        let display = path.display().to_string();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(base_name)
            .ok_or_else(|| TransferError::InvalidFilename(display))?;

        let max = self.config.max_filename_len();
        if name.len() > max {
            return Err(TransferError::FilenameTooLong {
                len: name.len(),
                max,
            });
        }
        Ok(name.to_owned())
    }

    fn enter(&mut self, state: SenderState) {
        log::debug!("[send] {} → {state}", self.state);
        self.state = state;
    }
}
