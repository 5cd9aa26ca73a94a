//! Engine phase types.
//!
//! Each engine walks a short, strictly forward sequence of phases.
//! Transitions live in [`crate::sender`] and [`crate::receiver`]; keeping the
//! types here lets both engines and their logs share one vocabulary.

use std::fmt;

/// Phases of the sending side.
///
/// ```text
///  AWAIT_INIT_ACK ──INIT acked──▶ STREAMING ──file read──▶ DRAINING ──all acked──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// INIT sent (and resent every loss timeout); waiting for its ACK.
    #[default]
    AwaitInitAck,
    /// Sending every chunk of the file once, back to back.
    Streaming,
    /// Resending expired segments until every offset is acknowledged.
    Draining,
    Done,
}

/// Phases of the receiving side.
///
/// ```text
///  AWAIT_INIT ──INIT──▶ RECEIVING ──file complete / null burst──▶ LINGERING ──quiet──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Polling until a valid INIT arrives.
    #[default]
    AwaitInit,
    /// Storing DATA segments and batching ACKs.
    Receiving,
    /// File complete; re-acknowledging late duplicates for the exit delay.
    Lingering,
    Done,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitInitAck => "AWAIT_INIT_ACK",
            Self::Streaming => "STREAMING",
            Self::Draining => "DRAINING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitInit => "AWAIT_INIT",
            Self::Receiving => "RECEIVING",
            Self::Lingering => "LINGERING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}
