//! Frame assembly: turning an unbounded, partially-delivered byte stream
//! (or a single datagram/HTTP body) into discrete, framing-validated
//! message buffers.
//!
//! A [`Frame`] is only ever produced once its framing discipline's
//! length/terminator condition is fully satisfied; partial frames are never
//! handed to a decoder. Checksums are verified here, over the exact
//! declared range, before dispatch — a mismatch is a distinct recoverable
//! outcome ([`FramingError::ChecksumMismatch`]), not a connection failure.

mod assembler;
mod blocks;
mod reader;

pub use assembler::{
    Assembler,
    single_shot,
};
pub use blocks::{
    BlockError,
    BlockReader,
};
use bytes::Bytes;
pub use reader::{
    FrameReader,
    ReadError,
};
use trackbee_codec::checksum::ChecksumFamily;

/// One self-contained protocol message extracted from a transport stream.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The message body a decoder reads. Framing overhead (header, length
    /// field, checksum, terminator) is already stripped.
    pub payload: Bytes,
    /// Wire value of the length field, if the discipline carries one.
    pub declared_length: Option<usize>,
    /// `Some(true)` when the discipline carries a checksum; mismatches
    /// never produce a `Frame`.
    pub checksum_valid: Option<bool>,
}

/// Byte order of multi-byte framing fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    fn read(&self, bytes: &[u8]) -> u64 {
        let mut value = 0u64;
        match self {
            Self::Big => {
                for byte in bytes {
                    value = value << 8 | u64::from(*byte);
                }
            }
            Self::Little => {
                for byte in bytes.iter().rev() {
                    value = value << 8 | u64::from(*byte);
                }
            }
        }
        value
    }

    fn write(&self, value: u64, width: usize, out: &mut Vec<u8>) {
        let bytes = value.to_be_bytes();
        let significant = &bytes[bytes.len() - width..];
        match self {
            Self::Big => out.extend_from_slice(significant),
            Self::Little => out.extend(significant.iter().rev()),
        }
    }
}

/// Framing discipline, selected per protocol.
#[derive(Clone, Debug)]
pub enum Framing {
    LengthPrefixed(LengthPrefixed),
    Delimited(Delimited),
    /// The entire input is the frame payload. Used by protocols whose
    /// transport already delimits messages (HTTP bodies).
    Raw { max_frame_length: usize },
}

/// Fixed header bytes followed by a length field, payload, optional
/// checksum and optional terminator.
#[derive(Clone, Debug)]
pub struct LengthPrefixed {
    /// Magic constant opening every frame. May be empty.
    pub header: &'static [u8],
    /// Width of the length field in bytes, 1 to 4.
    pub length_width: usize,
    pub length_order: Endianness,
    /// What the wire length value counts.
    pub length_counts: LengthCount,
    pub checksum: Option<ChecksumSpec>,
    /// Terminator bytes after the checksum. May be empty.
    pub trailer: &'static [u8],
    /// Frames whose declared size exceeds this are unrecoverable framing
    /// errors; the connection's buffered bytes are discarded.
    pub max_frame_length: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthCount {
    /// Bytes following the length field, excluding the terminator but
    /// including the checksum.
    Remainder,
    /// The whole frame, header through terminator.
    TotalFrame,
}

#[derive(Clone, Copy, Debug)]
pub struct ChecksumSpec {
    pub family: ChecksumFamily,
    pub coverage: Coverage,
    pub order: Endianness,
}

/// Range the checksum is computed over. Never more than the declared
/// range: formats that checksum past their declared length are module
/// bugs, not behavior to preserve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coverage {
    Payload,
    /// Length field bytes plus payload.
    LengthAndPayload,
}

/// Frames bounded by sentinel bytes, e.g. `$...#` or `*...\r\n`.
#[derive(Clone, Debug)]
pub struct Delimited {
    /// Opening sentinel. Bytes before it are discarded (resync after
    /// garbage). `None` means frames start wherever the last one ended.
    pub start: Option<u8>,
    /// Closing sentinel sequence.
    pub end: &'static [u8],
    pub max_frame_length: usize,
}

impl Framing {
    pub fn max_frame_length(&self) -> usize {
        match self {
            Self::LengthPrefixed(framing) => framing.max_frame_length,
            Self::Delimited(framing) => framing.max_frame_length,
            Self::Raw { max_frame_length } => *max_frame_length,
        }
    }

    /// Wraps a payload in this discipline's framing: header, length field,
    /// checksum and terminator as configured.
    ///
    /// Reply frames are built through this so they match the request
    /// protocol's own framing exactly.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            Self::LengthPrefixed(framing) => framing.encode(payload),
            Self::Delimited(framing) => framing.encode(payload),
            Self::Raw { .. } => payload.to_vec(),
        }
    }
}

impl LengthPrefixed {
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let checksum_width = self
            .checksum
            .as_ref()
            .map(|spec| spec.family.width())
            .unwrap_or(0);
        let prefix = self.header.len() + self.length_width;

        let declared = match self.length_counts {
            LengthCount::Remainder => payload.len() + checksum_width,
            LengthCount::TotalFrame => {
                prefix + payload.len() + checksum_width + self.trailer.len()
            }
        };

        let mut frame = Vec::with_capacity(prefix + declared + self.trailer.len());
        frame.extend_from_slice(self.header);
        self.length_order
            .write(declared as u64, self.length_width, &mut frame);
        frame.extend_from_slice(payload);

        if let Some(spec) = &self.checksum {
            let covered_from = match spec.coverage {
                Coverage::Payload => prefix,
                Coverage::LengthAndPayload => self.header.len(),
            };
            let checksum = spec.family.compute(&frame[covered_from..]);
            spec.order
                .write(checksum.into(), spec.family.width(), &mut frame);
        }

        frame.extend_from_slice(self.trailer);
        frame
    }
}

impl Delimited {
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + self.end.len() + 1);
        if let Some(start) = self.start {
            frame.push(start);
        }
        frame.extend_from_slice(payload);
        frame.extend_from_slice(self.end);
        frame
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// Declared length exceeds the configured maximum. The connection's
    /// buffer has been discarded; the connection itself stays open.
    #[error("declared frame length {declared} exceeds maximum {max}")]
    Oversized { declared: usize, max: usize },

    /// Checksum recomputation disagreed with the wire value. The frame's
    /// bytes have been consumed and dropped.
    #[error("checksum mismatch: wire {wire:#x}, computed {computed:#x}")]
    ChecksumMismatch { wire: u32, computed: u32 },

    /// Declared length is smaller than the frame's fixed overhead. The
    /// assembler skips ahead and resynchronizes.
    #[error("declared frame length {declared} is too short")]
    Undersized { declared: usize },

    /// Frame terminator bytes were not where the length field put them.
    /// The frame's bytes have been consumed and dropped.
    #[error("frame trailer malformed")]
    BadTrailer,

    /// No closing delimiter within the configured maximum. The buffer has
    /// been discarded.
    #[error("no frame delimiter within {max} bytes")]
    DelimiterOverrun { max: usize },

    /// A single-shot input (datagram, HTTP body) did not contain one
    /// complete frame.
    #[error("input does not contain a complete frame")]
    Truncated,
}
