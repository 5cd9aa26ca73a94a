//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between sender and receiver is a [`Segment`].
//! This module is responsible for:
//! - Defining the on-wire binary layout of the three segment kinds.
//! - Serialising segments into byte buffers ready for transmission.
//! - Deserialising raw byte slices back into typed segments, returning a
//!   [`SegmentError`] for malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**, unsigned and fixed width.
//!
//! ```text
//!  INIT   +------+---------------+---------------------------------+
//!         | 0x01 |  filesize (4) |  filename (UTF-8, rest of dgram)|
//!         +------+---------------+---------------------------------+
//!
//!  DATA   +------+---------------+---------------+-----------------+
//!         | 0x02 |  sequence (4) |  checksum (4) |  payload ...    |
//!         +------+---------------+---------------+-----------------+
//!
//!  ACK    +------+---------------+
//!         | 0x03 |  sequence (4) |
//!         +------+---------------+
//! ```
//!
//! The sequence number of a DATA segment is the absolute byte offset of its
//! payload within the file.  Because the field is four bytes wide, files of
//! 2^32 bytes or more cannot be addressed; the sender refuses them up front.
//!
//! The checksum is a CRC-32 over the raw payload bytes only (header
//! excluded).

use std::fmt;

use thiserror::Error;

/// Largest datagram either side will emit or accept.
pub const MAX_SEGMENT_SIZE: usize = 1024;

// Field widths.
pub const TYPE_LEN: usize = 1;
pub const SEQUENCE_LEN: usize = 4;
pub const CHECKSUM_LEN: usize = 4;
pub const FILESIZE_LEN: usize = 4;

/// Byte length of the DATA header: type(1) + sequence(4) + checksum(4).
pub const HEADER_SIZE: usize = TYPE_LEN + SEQUENCE_LEN + CHECKSUM_LEN;

/// Largest payload a DATA segment may carry at the default segment size.
pub const MAX_PAYLOAD_SIZE: usize = MAX_SEGMENT_SIZE - HEADER_SIZE;

/// Byte length of an encoded ACK segment.
pub const ACK_SEGMENT_SIZE: usize = TYPE_LEN + SEQUENCE_LEN;

/// Byte length of an INIT segment before the filename.
pub const INIT_HEADER_SIZE: usize = TYPE_LEN + FILESIZE_LEN;

/// Sequence number reserved for acknowledging the INIT handshake.
///
/// The ASCII bytes `"ffff"` read as a big-endian integer (`0x6666_6666`).
pub const INIT_SEQUENCE_NUMBER: u32 = u32::from_be_bytes(*b"ffff");

// Byte offsets of each field within the serialised segment.
const OFF_TYPE: usize = 0;
const OFF_SEQUENCE: usize = TYPE_LEN;
const OFF_CHECKSUM: usize = OFF_SEQUENCE + SEQUENCE_LEN;
const OFF_FILESIZE: usize = TYPE_LEN;

// ---------------------------------------------------------------------------
// Segment type
// ---------------------------------------------------------------------------

/// Discriminant carried in the first byte of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentType {
    Init = 1,
    Data = 2,
    Ack = 3,
}

impl TryFrom<u8> for SegmentType {
    type Error = SegmentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Init),
            2 => Ok(Self::Data),
            3 => Ok(Self::Ack),
            other => Err(SegmentError::UnknownType(other)),
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Data => "DATA",
            Self::Ack => "ACK",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw datagram.
///
/// Engines never propagate these: a datagram that fails to decode is noise
/// and is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    /// Zero-length datagram.
    #[error("empty datagram")]
    Empty,
    /// First byte is not a known [`SegmentType`].
    #[error("unknown segment type {0:#04x}")]
    UnknownType(u8),
    /// Buffer shorter than the fixed fields of its declared type.
    #[error("{kind} segment truncated to {len} bytes")]
    Truncated { kind: SegmentType, len: usize },
    /// A typed decoder was handed a segment of a different kind.
    #[error("expected {expected} segment, found {found}")]
    UnexpectedType {
        expected: SegmentType,
        found: SegmentType,
    },
    /// Filename is not UTF-8 or has no usable base name.
    #[error("invalid filename in INIT segment")]
    InvalidFilename,
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A decoded protocol segment.
///
/// DATA payloads borrow from the datagram buffer they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Transfer announcement: total file size and base name.
    Init { filesize: u32, filename: String },
    /// A chunk of file content starting at byte offset `seq`.
    Data {
        seq: u32,
        checksum: u32,
        payload: &'a [u8],
    },
    /// Acknowledges a DATA offset or [`INIT_SEQUENCE_NUMBER`].
    Ack { seq: u32 },
}

impl<'a> Segment<'a> {
    /// Parse any segment kind from a raw datagram.
    pub fn decode(buf: &'a [u8]) -> Result<Self, SegmentError> {
        match segment_type(buf)? {
            SegmentType::Init => {
                let (filesize, filename) = decode_init(buf)?;
                Ok(Segment::Init { filesize, filename })
            }
            SegmentType::Data => {
                let DataSegment {
                    seq,
                    checksum,
                    payload,
                } = decode_data(buf)?;
                Ok(Segment::Data {
                    seq,
                    checksum,
                    payload,
                })
            }
            SegmentType::Ack => Ok(Segment::Ack {
                seq: decode_ack(buf)?,
            }),
        }
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Segment::Init { filesize, filename } => encode_init(*filesize, filename),
            Segment::Data {
                seq,
                checksum,
                payload,
            } => encode_data(*seq, *checksum, payload),
            Segment::Ack { seq } => encode_ack(*seq),
        }
    }

    pub fn kind(&self) -> SegmentType {
        match self {
            Segment::Init { .. } => SegmentType::Init,
            Segment::Data { .. } => SegmentType::Data,
            Segment::Ack { .. } => SegmentType::Ack,
        }
    }
}

/// Borrowed view of a decoded DATA segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSegment<'a> {
    pub seq: u32,
    pub checksum: u32,
    pub payload: &'a [u8],
}

impl DataSegment<'_> {
    /// `true` when the CRC-32 of the payload matches the claimed checksum.
    pub fn is_intact(&self) -> bool {
        checksum(self.payload) == self.checksum
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// Encode an INIT segment announcing `filesize` bytes under `filename`.
pub fn encode_init(filesize: u32, filename: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(INIT_HEADER_SIZE + filename.len());
    buf.push(SegmentType::Init as u8);
    buf.extend_from_slice(&filesize.to_be_bytes());
    buf.extend_from_slice(filename.as_bytes());
    buf
}

/// Encode a DATA segment.  `crc` should be [`checksum`] of `payload`.
pub fn encode_data(seq: u32, crc: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE + payload.len()];
    buf[OFF_TYPE] = SegmentType::Data as u8;
    buf[OFF_SEQUENCE..OFF_SEQUENCE + SEQUENCE_LEN].copy_from_slice(&seq.to_be_bytes());
    buf[OFF_CHECKSUM..OFF_CHECKSUM + CHECKSUM_LEN].copy_from_slice(&crc.to_be_bytes());
    buf[HEADER_SIZE..].copy_from_slice(payload);
    buf
}

/// Encode an ACK segment for `seq`.
pub fn encode_ack(seq: u32) -> Vec<u8> {
    let mut buf = [0u8; ACK_SEGMENT_SIZE];
    buf[OFF_TYPE] = SegmentType::Ack as u8;
    buf[OFF_SEQUENCE..].copy_from_slice(&seq.to_be_bytes());
    buf.to_vec()
}

/// CRC-32 (IEEE) over `payload`.
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Read the type byte of a datagram.
pub fn segment_type(buf: &[u8]) -> Result<SegmentType, SegmentError> {
    let first = *buf.first().ok_or(SegmentError::Empty)?;
    SegmentType::try_from(first)
}

/// Decode an INIT segment into `(filesize, base name)`.
///
/// Any directory component of the transmitted name is stripped, so a
/// receiver can never be steered outside its output directory.
pub fn decode_init(buf: &[u8]) -> Result<(u32, String), SegmentError> {
    expect_type(buf, SegmentType::Init)?;
    if buf.len() < INIT_HEADER_SIZE {
        return Err(SegmentError::Truncated {
            kind: SegmentType::Init,
            len: buf.len(),
        });
    }

    let filesize = read_u32(buf, OFF_FILESIZE);
    let raw = std::str::from_utf8(&buf[INIT_HEADER_SIZE..])
        .map_err(|_| SegmentError::InvalidFilename)?;
    let filename = base_name(raw).ok_or(SegmentError::InvalidFilename)?;

    Ok((filesize, filename.to_owned()))
}

/// Decode a DATA segment.  The checksum is returned, not verified.
pub fn decode_data(buf: &[u8]) -> Result<DataSegment<'_>, SegmentError> {
    expect_type(buf, SegmentType::Data)?;
    if buf.len() < HEADER_SIZE {
        return Err(SegmentError::Truncated {
            kind: SegmentType::Data,
            len: buf.len(),
        });
    }

    Ok(DataSegment {
        seq: read_u32(buf, OFF_SEQUENCE),
        checksum: read_u32(buf, OFF_CHECKSUM),
        payload: &buf[HEADER_SIZE..],
    })
}

/// Decode an ACK segment into its sequence number.
pub fn decode_ack(buf: &[u8]) -> Result<u32, SegmentError> {
    expect_type(buf, SegmentType::Ack)?;
    if buf.len() < ACK_SEGMENT_SIZE {
        return Err(SegmentError::Truncated {
            kind: SegmentType::Ack,
            len: buf.len(),
        });
    }
    Ok(read_u32(buf, OFF_SEQUENCE))
}

/// Final path component of `name`, splitting on both `/` and `\`.
///
/// Returns `None` when nothing usable remains (empty, `.`, `..`, or a name
/// containing NUL).
pub fn base_name(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?;
    match base {
        "" | "." | ".." => None,
        b if b.contains('\0') => None,
        b => Some(b),
    }
}

fn expect_type(buf: &[u8], expected: SegmentType) -> Result<(), SegmentError> {
    let found = segment_type(buf)?;
    if found != expected {
        return Err(SegmentError::UnexpectedType { expected, found });
    }
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_sequence_number_is_ascii_ffff() {
        assert_eq!(INIT_SEQUENCE_NUMBER, 0x6666_6666);
        assert_eq!(&INIT_SEQUENCE_NUMBER.to_be_bytes(), b"ffff");
    }

    #[test]
    fn header_constants() {
        assert_eq!(HEADER_SIZE, 9);
        assert_eq!(MAX_PAYLOAD_SIZE, 1015);
        assert_eq!(ACK_SEGMENT_SIZE, 5);
    }

    #[test]
    fn init_roundtrip() {
        let bytes = encode_init(2050, "report.pdf");
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..5], &2050u32.to_be_bytes());
        assert_eq!(decode_init(&bytes), Ok((2050, "report.pdf".to_owned())));
    }

    #[test]
    fn init_decode_strips_directories() {
        let bytes = encode_init(7, "../../etc/passwd");
        assert_eq!(decode_init(&bytes), Ok((7, "passwd".to_owned())));

        let bytes = encode_init(7, r"C:\temp\notes.txt");
        assert_eq!(decode_init(&bytes), Ok((7, "notes.txt".to_owned())));
    }

    #[test]
    fn init_decode_rejects_unusable_names() {
        for name in ["", "dir/", "..", "a/.", "bad\0name"] {
            assert_eq!(
                decode_init(&encode_init(1, name)),
                Err(SegmentError::InvalidFilename),
                "{name:?}"
            );
        }
        let mut bytes = encode_init(1, "x");
        bytes[INIT_HEADER_SIZE] = 0xff;
        assert_eq!(decode_init(&bytes), Err(SegmentError::InvalidFilename));
    }

    #[test]
    fn data_roundtrip_and_checksum() {
        let payload = b"the quick brown fox";
        let bytes = encode_data(1015, checksum(payload), payload);
        assert_eq!(bytes.len(), HEADER_SIZE + payload.len());

        let data = decode_data(&bytes).unwrap();
        assert_eq!(data.seq, 1015);
        assert_eq!(data.payload, payload);
        assert!(data.is_intact());
    }

    #[test]
    fn mutated_payload_fails_integrity() {
        let payload = b"integrity";
        let mut bytes = encode_data(0, checksum(payload), payload);
        *bytes.last_mut().unwrap() ^= 0x01;
        assert!(!decode_data(&bytes).unwrap().is_intact());
    }

    #[test]
    fn empty_payload_data_segment() {
        let bytes = encode_data(0, checksum(&[]), &[]);
        let data = decode_data(&bytes).unwrap();
        assert!(data.payload.is_empty());
        assert!(data.is_intact());
    }

    #[test]
    fn ack_roundtrip_big_endian() {
        let bytes = encode_ack(0x0102_0304);
        assert_eq!(bytes, vec![3, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(decode_ack(&bytes), Ok(0x0102_0304));
    }

    #[test]
    fn malformed_datagrams_are_decode_failures() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::Empty));
        assert_eq!(Segment::decode(&[9, 0, 0]), Err(SegmentError::UnknownType(9)));
        assert_eq!(
            Segment::decode(&[3, 0, 0]),
            Err(SegmentError::Truncated {
                kind: SegmentType::Ack,
                len: 3
            })
        );
        assert_eq!(
            Segment::decode(&[2, 0, 0, 0, 0, 0]),
            Err(SegmentError::Truncated {
                kind: SegmentType::Data,
                len: 6
            })
        );
        assert_eq!(
            Segment::decode(&[1, 0]),
            Err(SegmentError::Truncated {
                kind: SegmentType::Init,
                len: 2
            })
        );
    }

    #[test]
    fn typed_decoder_rejects_other_kinds() {
        assert_eq!(
            decode_ack(&encode_init(1, "f")),
            Err(SegmentError::UnexpectedType {
                expected: SegmentType::Ack,
                found: SegmentType::Init
            })
        );
    }

    #[test]
    fn segment_enum_dispatch() {
        let ack = encode_ack(INIT_SEQUENCE_NUMBER);
        assert_eq!(
            Segment::decode(&ack),
            Ok(Segment::Ack {
                seq: INIT_SEQUENCE_NUMBER
            })
        );

        let seg = Segment::Data {
            seq: 42,
            checksum: checksum(b"abc"),
            payload: b"abc",
        };
        let bytes = seg.encode();
        assert_eq!(Segment::decode(&bytes), Ok(seg));
        assert_eq!(Segment::decode(&bytes).unwrap().kind(), SegmentType::Data);
    }
}
