//! `urft`: reliable transfer of a single file over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   INIT, DATA    ┌──────────────┐
//!  │    Sender    │────────────────▶│   Receiver   │
//!  │ (urft-client)│                 │ (urft-server)│
//!  └──────┬───────┘◀────────────────└──────┬───────┘
//!         │             ACKs               │
//!  ┌──────▼────────┐               ┌───────▼────────┐
//!  │RetransmitQueue│               │ReassemblyBuffer│
//!  │  SourceFile   │               │  AckBatcher    │
//!  └──────┬────────┘               │  SinkFile      │
//!         │                        └───────┬────────┘
//!         │       raw UDP datagrams        │
//!  ┌──────▼────────────────────────────────▼──┐
//!  │                 Socket                   │  (thin async wrapper around tokio UdpSocket)
//!  └──────────────────────────────────────────┘
//! ```
//!
//! Sequence numbers are byte offsets into the file, so every DATA segment is
//! independently placeable and every ACK names exactly one segment.
//!
//! Each module has a single responsibility:
//! - [`packet`]       wire format (INIT / DATA / ACK)
//! - [`config`]       protocol constants and tunable timings
//! - [`socket`]       async UDP socket abstraction
//! - [`retransmit`]   deadline-ordered set of unacknowledged offsets
//! - [`reassembly`]   out-of-order buffer with a contiguous write mark
//! - [`ack_batcher`]  pending / recently-acked bookkeeping and batched flushes
//! - [`storage`]      file reading and writing
//! - [`sender`]       sending engine
//! - [`receiver`]     receiving engine
//! - [`state`]        engine phase types
//! - [`error`]        fatal transfer errors

pub mod ack_batcher;
pub mod config;
pub mod error;
pub mod packet;
pub mod reassembly;
pub mod receiver;
pub mod retransmit;
pub mod sender;
pub mod socket;
pub mod state;
pub mod storage;

pub use config::{ProtocolConfig, ReceiverOptions};
pub use error::TransferError;
pub use receiver::{ReceiveReport, Receiver};
pub use sender::{SendReport, Sender};
