//! Receiving side of a transfer.
//!
//! [`Receiver`] binds a UDP socket and accepts exactly one file:
//!
//! 1. **AWAIT_INIT**: poll until a valid INIT arrives.  Record its size and
//!    base name, replace any existing file of that name, and acknowledge the
//!    handshake at once.
//! 2. **RECEIVING**: feed every datagram from the sender through
//!    [`TransferState::ingest`], append the contiguous prefix to the file,
//!    and let the [`AckBatcher`] emit ACKs once a burst of arrivals has gone
//!    quiet.  Ends when every byte is written, or when the sender is taken to
//!    have gone away after a burst of empty datagrams.
//! 3. **LINGERING**: flush what is still pending, then keep answering late
//!    duplicates for the exit delay so a sender whose last ACKs were lost
//!    can finish.  Nothing is written in this phase.
//!
//! All transfer state is created by one [`Receiver::listen`] call and dropped
//! at its end; a new call starts a new transfer.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::time::Instant;

use crate::ack_batcher::AckBatcher;
use crate::config::{ProtocolConfig, ReceiverOptions};
use crate::error::TransferError;
use crate::packet::{checksum, decode_init, Segment, INIT_SEQUENCE_NUMBER};
use crate::reassembly::ReassemblyBuffer;
use crate::socket::{DatagramSink, Socket};
use crate::state::ReceiverState;
use crate::storage::SinkFile;

// ---------------------------------------------------------------------------
// Ingest outcome
// ---------------------------------------------------------------------------

/// What [`TransferState::ingest`] did with a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// New payload buffered and its ACK queued.
    Stored,
    /// Payload already held or written; ACK queued again, nothing stored.
    Duplicate,
    /// Already acknowledged; moved back to pending for another ACK.
    Reacked,
    /// CRC mismatch.  Dropped without an ACK.
    Corrupt,
    /// Payload reaches past the announced file size.  Dropped without an ACK.
    OutOfRange,
    /// Undecodable, or a segment kind the receiver does not act on.
    Ignored,
}

impl Ingest {
    /// `true` when the datagram was accepted and an ACK is queued for it.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Stored | Self::Duplicate | Self::Reacked)
    }
}

// ---------------------------------------------------------------------------
// TransferState
// ---------------------------------------------------------------------------

/// Everything the receiver knows about the transfer in progress.
#[derive(Debug)]
pub struct TransferState {
    filesize: u32,
    filename: String,
    reassembly: ReassemblyBuffer,
    acks: AckBatcher,
    stored: usize,
    duplicates: usize,
    corrupt: usize,
    acks_sent: usize,
}

impl TransferState {
    pub fn new(filesize: u32, filename: String, config: &ProtocolConfig) -> Self {
        Self {
            filesize,
            filename,
            reassembly: ReassemblyBuffer::new(),
            acks: AckBatcher::new(config.max_ack_per_batch, config.consecutive_packets_timeout),
            stored: 0,
            duplicates: 0,
            corrupt: 0,
            acks_sent: 0,
        }
    }

    pub fn filesize(&self) -> u32 {
        self.filesize
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Offset of the first byte not yet written.
    pub fn next_offset(&self) -> u32 {
        self.reassembly.next_offset()
    }

    pub fn is_complete(&self) -> bool {
        self.next_offset() >= self.filesize
    }

    pub fn acks(&self) -> &AckBatcher {
        &self.acks
    }

    /// Process one non-empty datagram from the sender.
    pub fn ingest(&mut self, datagram: &[u8]) -> Ingest {
        let segment = match Segment::decode(datagram) {
            Ok(segment) => segment,
            Err(e) => {
                log::trace!("[recv] ignoring datagram: {e}");
                return Ingest::Ignored;
            }
        };

        match segment {
            Segment::Data {
                seq,
                checksum: claimed,
                payload,
            } => self.ingest_data(seq, claimed, payload),
            Segment::Init { filesize, filename }
                if filesize == self.filesize && filename == self.filename =>
            {
                log::debug!("[recv] ← duplicate INIT, re-acking");
                if !self.acks.reack(INIT_SEQUENCE_NUMBER) {
                    self.acks.enqueue(INIT_SEQUENCE_NUMBER);
                }
                Ingest::Reacked
            }
            other => {
                log::trace!("[recv] ignoring {} segment", other.kind());
                Ingest::Ignored
            }
        }
    }

    fn ingest_data(&mut self, seq: u32, claimed: u32, payload: &[u8]) -> Ingest {
        if self.acks.reack(seq) {
            self.duplicates += 1;
            log::debug!("[recv] ← DATA seq={seq} already acked, re-acking");
            return Ingest::Reacked;
        }

        let computed = checksum(payload);
        if computed != claimed {
            self.corrupt += 1;
            log::warn!("[recv] crc mismatch for seq={seq}: claimed {claimed:#010x}, got {computed:#010x}");
            return Ingest::Corrupt;
        }

        if u64::from(seq) + payload.len() as u64 > u64::from(self.filesize) {
            log::warn!(
                "[recv] DATA seq={seq} len={} runs past filesize {}",
                payload.len(),
                self.filesize
            );
            return Ingest::OutOfRange;
        }

        self.acks.enqueue(seq);
        if self.reassembly.insert(seq, payload.to_vec()) {
            self.stored += 1;
            log::debug!("[recv] ← DATA seq={seq} len={}", payload.len());
            Ingest::Stored
        } else {
            self.duplicates += 1;
            log::debug!("[recv] ← DATA seq={seq} duplicate, not stored");
            Ingest::Duplicate
        }
    }

    /// Payloads now contiguous with the written prefix, in file order.
    pub fn drain_contiguous(&mut self) -> Vec<Vec<u8>> {
        self.reassembly.drain_contiguous()
    }

    /// Emit one batch of pending ACKs to `dest`.
    pub async fn flush_acks<S: DatagramSink>(&mut self, sink: &S, dest: SocketAddr) -> usize {
        let sent = self.acks.flush(sink, dest).await;
        self.acks_sent += sent;
        sent
    }

    /// Flush batches until nothing is pending or a batch makes no progress.
    pub async fn flush_all_acks<S: DatagramSink>(&mut self, sink: &S, dest: SocketAddr) {
        while self.acks.pending_len() > 0 {
            if self.flush_acks(sink, dest).await == 0 {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReceiveReport
// ---------------------------------------------------------------------------

/// Summary of a finished receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub filename: String,
    pub path: PathBuf,
    pub filesize: u32,
    pub bytes_written: u64,
    pub segments_stored: usize,
    pub duplicates: usize,
    pub corrupt: usize,
    pub acks_sent: usize,
    /// The sender was taken to have gone away after a burst of empty datagrams.
    pub closed_by_nulls: bool,
}

impl ReceiveReport {
    pub fn is_complete(&self) -> bool {
        self.bytes_written == u64::from(self.filesize)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// One receiving endpoint, good for one transfer.
#[derive(Debug)]
pub struct Receiver {
    socket: Socket,
    config: ProtocolConfig,
    options: ReceiverOptions,
    state: ReceiverState,
}

impl Receiver {
    pub async fn bind(
        addr: SocketAddr,
        config: ProtocolConfig,
        options: ReceiverOptions,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let socket = Socket::bind(addr, config.max_segment_size).await?;
        Ok(Self {
            socket,
            config,
            options,
            state: ReceiverState::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Accept one file, then release the socket.
    pub async fn listen(mut self) -> Result<ReceiveReport, TransferError> {
        log::info!("[recv] listening on {}", self.socket.local_addr);

        let (peer, mut transfer) = self.await_init().await?;
        let mut sink = SinkFile::create_fresh(&self.options.output_dir, transfer.filename()).await?;

        transfer.acks.enqueue(INIT_SEQUENCE_NUMBER);
        transfer.flush_acks(&self.socket, peer).await;

        let closed_by_nulls = self.receive(peer, &mut transfer, &mut sink).await?;

        transfer.flush_all_acks(&self.socket, peer).await;
        sink.finish().await?;
        if transfer.is_complete() {
            log::info!("[recv] received all of {}", transfer.filename());
        } else {
            log::warn!(
                "[recv] {} incomplete: {} of {} bytes",
                transfer.filename(),
                sink.written(),
                transfer.filesize()
            );
        }

        if !closed_by_nulls {
            self.linger(peer, &mut transfer).await;
        }
        self.enter(ReceiverState::Done);

        Ok(ReceiveReport {
            filename: transfer.filename.clone(),
            path: sink.path().to_path_buf(),
            filesize: transfer.filesize,
            bytes_written: sink.written(),
            segments_stored: transfer.stored,
            duplicates: transfer.duplicates,
            corrupt: transfer.corrupt,
            acks_sent: transfer.acks_sent,
            closed_by_nulls,
        })
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn await_init(&mut self) -> Result<(SocketAddr, TransferState), TransferError> {
        loop {
            let polled = self
                .socket
                .recv_timeout(self.config.consecutive_packets_timeout)
                .await?;
            let Some((datagram, from)) = polled else {
                continue;
            };
            if datagram.is_empty() {
                continue;
            }
            match decode_init(&datagram) {
                Ok((filesize, filename)) => {
                    log::info!("[recv] filename {filename}");
                    log::info!("[recv] filesize {filesize} from {from}");
                    let transfer = TransferState::new(filesize, filename, &self.config);
                    return Ok((from, transfer));
                }
                Err(e) => log::trace!("[recv] waiting for INIT, ignoring datagram: {e}"),
            }
        }
    }

    /// Returns `true` when the loop ended on a burst of empty datagrams.
    async fn receive(
        &mut self,
        peer: SocketAddr,
        transfer: &mut TransferState,
        sink: &mut SinkFile,
    ) -> Result<bool, TransferError> {
        self.enter(ReceiverState::Receiving);
        let mut nulls = 0usize;
        let mut held_nulls: Vec<Vec<u8>> = Vec::new();
        let mut last_heard = Instant::now();

        while !transfer.is_complete() {
            let polled = self
                .socket
                .recv_timeout(self.config.consecutive_packets_timeout)
                .await?;

            match polled {
                Some((_, from)) if from != peer => {
                    log::trace!("[recv] ignoring datagram from {from}");
                }
                Some((datagram, _)) if datagram.is_empty() => {
                    last_heard = Instant::now();
                    nulls += 1;
                    if nulls > self.config.connection_end_nulls_count {
                        log::warn!("[recv] closing connection after {nulls} empty datagrams");
                        return Ok(true);
                    }
                    held_nulls.push(datagram);
                }
                Some((datagram, _)) => {
                    last_heard = Instant::now();
                    // Flushes finish before the next read on this task, so
                    // processing is never paused here.
                    debug_assert!(transfer.acks().is_accepting());
                    nulls = 0;
                    for held in held_nulls.drain(..) {
                        transfer.ingest(&held);
                    }
                    if transfer.ingest(&datagram).is_success() {
                        transfer.acks.schedule(Instant::now());
                        for payload in transfer.drain_contiguous() {
                            sink.append(&payload).await?;
                        }
                    }
                }
                None => {}
            }

            if transfer.acks().is_due(Instant::now()) {
                log::debug!("[recv] sending backlogged acks");
                transfer.flush_acks(&self.socket, peer).await;
            }

            if last_heard.elapsed() >= self.config.socket_timeout {
                log::warn!(
                    "[recv] no data from {peer} for {:?} at offset {}",
                    self.config.socket_timeout,
                    transfer.next_offset()
                );
                return Err(TransferError::Timeout(self.config.socket_timeout));
            }
        }
        Ok(false)
    }

    /// Re-acknowledge late duplicates until the sender has been quiet for
    /// the exit delay.  Errors here cannot undo a finished file, so they end
    /// the phase instead of the transfer.
    async fn linger(&mut self, peer: SocketAddr, transfer: &mut TransferState) {
        if self.config.exit_delay.is_zero() {
            return;
        }
        self.enter(ReceiverState::Lingering);

        let mut quiet_until = Instant::now() + self.config.exit_delay;
        loop {
            let now = Instant::now();
            if now >= quiet_until {
                break;
            }
            let wait = (quiet_until - now).min(self.config.consecutive_packets_timeout);
            let polled = match self.socket.recv_timeout(wait).await {
                Ok(polled) => polled,
                Err(e) => {
                    log::debug!("[recv] stop lingering: {e}");
                    break;
                }
            };
            let Some((datagram, from)) = polled else {
                continue;
            };
            if from != peer || datagram.is_empty() {
                continue;
            }

            quiet_until = Instant::now() + self.config.exit_delay;
            if transfer.ingest(&datagram).is_success() {
                transfer.flush_all_acks(&self.socket, peer).await;
            }
        }
    }

    fn enter(&mut self, state: ReceiverState) {
        log::debug!("[recv] {} → {state}", self.state);
        self.state = state;
    }
}
