use bytes::{
    Buf,
    Bytes,
    BytesMut,
};

use crate::{
    Coverage,
    Delimited,
    Frame,
    Framing,
    FramingError,
    LengthCount,
    LengthPrefixed,
};

/// Incremental frame assembler for one connection.
///
/// Feed bytes with [`push`][Self::push] as they arrive, then drain complete
/// frames with [`next_frame`][Self::next_frame]. Residual bytes stay
/// buffered until more data arrives. Errors are recoverable: the assembler
/// has already consumed or discarded the offending bytes and the caller
/// can keep reading from the same connection.
#[derive(Debug)]
pub struct Assembler {
    framing: Framing,
    buffer: BytesMut,
}

impl Assembler {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Extracts the next complete frame, if the buffer holds one.
    ///
    /// `Ok(None)` means more data is needed. [`Framing::Raw`] never
    /// completes here; raw inputs only arrive whole, through
    /// [`single_shot`].
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        match &self.framing {
            Framing::LengthPrefixed(framing) => next_length_prefixed(&mut self.buffer, framing),
            Framing::Delimited(framing) => next_delimited(&mut self.buffer, framing),
            Framing::Raw { .. } => Ok(None),
        }
    }
}

/// Assembles a frame from a complete single-shot input: a datagram or an
/// HTTP body. The same length/checksum validation applies where the
/// framing discipline defines it; trailing bytes beyond the first frame
/// are ignored.
pub fn single_shot(framing: &Framing, input: &[u8]) -> Result<Frame, FramingError> {
    match framing {
        Framing::Raw { max_frame_length } => {
            if input.len() > *max_frame_length {
                return Err(FramingError::Oversized {
                    declared: input.len(),
                    max: *max_frame_length,
                });
            }
            Ok(Frame {
                payload: Bytes::copy_from_slice(input),
                declared_length: None,
                checksum_valid: None,
            })
        }
        _ => {
            let mut assembler = Assembler::new(framing.clone());
            assembler.push(input);
            assembler.next_frame()?.ok_or(FramingError::Truncated)
        }
    }
}

fn next_length_prefixed(
    buffer: &mut BytesMut,
    framing: &LengthPrefixed,
) -> Result<Option<Frame>, FramingError> {
    if !framing.header.is_empty() {
        resync(buffer, framing.header);
    }

    let prefix = framing.header.len() + framing.length_width;
    if buffer.len() < prefix {
        return Ok(None);
    }

    let declared = framing
        .length_order
        .read(&buffer[framing.header.len()..prefix]) as usize;
    let checksum_width = framing
        .checksum
        .as_ref()
        .map(|spec| spec.family.width())
        .unwrap_or(0);

    let total = match framing.length_counts {
        LengthCount::Remainder => prefix + declared + framing.trailer.len(),
        LengthCount::TotalFrame => declared,
    };

    if total > framing.max_frame_length {
        buffer.clear();
        return Err(FramingError::Oversized {
            declared: total,
            max: framing.max_frame_length,
        });
    }

    let overhead = prefix + checksum_width + framing.trailer.len();
    if total < overhead {
        // the length field can't be right; skip the header so the next
        // call resyncs on the following bytes
        buffer.advance(framing.header.len().max(1).min(buffer.len()));
        return Err(FramingError::Undersized { declared });
    }

    if buffer.len() < total {
        return Ok(None);
    }

    // the frame is consumed from the buffer whether or not it validates
    let frame_bytes = buffer.split_to(total).freeze();

    if !framing.trailer.is_empty()
        && frame_bytes[total - framing.trailer.len()..] != *framing.trailer
    {
        return Err(FramingError::BadTrailer);
    }

    let payload_start = prefix;
    let payload_end = total - framing.trailer.len() - checksum_width;

    let checksum_valid = match &framing.checksum {
        Some(spec) => {
            let covered = match spec.coverage {
                Coverage::Payload => &frame_bytes[payload_start..payload_end],
                Coverage::LengthAndPayload => &frame_bytes[framing.header.len()..payload_end],
            };
            let wire =
                spec.order.read(&frame_bytes[payload_end..payload_end + checksum_width]) as u32;
            let computed = spec.family.compute(covered);
            if computed != wire {
                return Err(FramingError::ChecksumMismatch { wire, computed });
            }
            Some(true)
        }
        None => None,
    };

    Ok(Some(Frame {
        payload: frame_bytes.slice(payload_start..payload_end),
        declared_length: Some(declared),
        checksum_valid,
    }))
}

fn next_delimited(
    buffer: &mut BytesMut,
    framing: &Delimited,
) -> Result<Option<Frame>, FramingError> {
    let payload_start = match framing.start {
        Some(start) => {
            match buffer.iter().position(|byte| *byte == start) {
                Some(index) => {
                    if index > 0 {
                        tracing::trace!(skipped = index, "skipping bytes before frame start");
                        buffer.advance(index);
                    }
                    1
                }
                None => {
                    // nothing but garbage so far
                    buffer.clear();
                    return Ok(None);
                }
            }
        }
        None => 0,
    };

    if let Some(index) = find(&buffer[payload_start..], framing.end) {
        let total = payload_start + index + framing.end.len();
        let frame_bytes = buffer.split_to(total).freeze();
        return Ok(Some(Frame {
            payload: frame_bytes.slice(payload_start..payload_start + index),
            declared_length: None,
            checksum_valid: None,
        }));
    }

    // a partial terminator at the end of the buffer is simply left in
    // place; the next read completes it and the rescan finds it
    if buffer.len() > framing.max_frame_length {
        buffer.clear();
        return Err(FramingError::DelimiterOverrun {
            max: framing.max_frame_length,
        });
    }

    Ok(None)
}

/// Drops leading bytes that can't open a frame, keeping a partial header
/// match at the end of the buffer.
fn resync(buffer: &mut BytesMut, header: &[u8]) {
    let mut index = 0;
    while index < buffer.len() {
        let window = &buffer[index..];
        let length = window.len().min(header.len());
        if window[..length] == header[..length] {
            break;
        }
        index += 1;
    }

    if index > 0 {
        tracing::trace!(skipped = index, "skipping bytes before frame header");
        buffer.advance(index);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use trackbee_codec::checksum::ChecksumFamily;

    use crate::{
        Assembler,
        ChecksumSpec,
        Coverage,
        Delimited,
        Endianness,
        Framing,
        FramingError,
        LengthCount,
        LengthPrefixed,
        single_shot,
    };

    fn binary_framing() -> Framing {
        Framing::LengthPrefixed(LengthPrefixed {
            header: &[0x78, 0x78],
            length_width: 1,
            length_order: Endianness::Big,
            length_counts: LengthCount::Remainder,
            checksum: Some(ChecksumSpec {
                family: ChecksumFamily::Crc16X25,
                coverage: Coverage::LengthAndPayload,
                order: Endianness::Big,
            }),
            trailer: &[0x0d, 0x0a],
            max_frame_length: 256,
        })
    }

    /// Builds a valid frame for [`binary_framing`] around `payload`.
    fn binary_frame(payload: &[u8]) -> Vec<u8> {
        let declared = payload.len() + 2;
        let mut covered = vec![declared as u8];
        covered.extend_from_slice(payload);
        let crc = ChecksumFamily::Crc16X25.compute(&covered) as u16;

        let mut frame = vec![0x78, 0x78];
        frame.extend_from_slice(&covered);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0d, 0x0a]);
        frame
    }

    #[test]
    fn complete_frame_in_one_read() {
        let mut assembler = Assembler::new(binary_framing());
        assembler.push(&binary_frame(b"\x01hello"));

        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x01hello");
        assert_eq!(frame.declared_length, Some(8));
        assert_eq!(frame.checksum_valid, Some(true));
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn split_across_any_boundary_yields_the_same_frame() {
        let wire = binary_frame(b"\x12position-payload");

        for split in 1..wire.len() {
            let mut assembler = Assembler::new(binary_framing());
            assembler.push(&wire[..split]);
            while let Some(frame) = assembler.next_frame().unwrap() {
                panic!("complete frame {frame:?} from a partial read at {split}");
            }
            assembler.push(&wire[split..]);

            let frame = assembler.next_frame().unwrap().unwrap();
            assert_eq!(&frame.payload[..], b"\x12position-payload");
            assert_eq!(assembler.next_frame().unwrap().map(|f| f.payload), None);
        }
    }

    #[test]
    fn three_way_split() {
        // the end-to-end shape: 4 bytes, 3 bytes, remainder
        let wire = binary_frame(b"\x01payload");
        let mut assembler = Assembler::new(binary_framing());

        assembler.push(&wire[..4]);
        assert!(assembler.next_frame().unwrap().is_none());
        assembler.push(&wire[4..7]);
        assert!(assembler.next_frame().unwrap().is_none());
        assembler.push(&wire[7..]);

        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x01payload");
    }

    #[test]
    fn corrupt_checksum_drops_only_that_frame() {
        let mut corrupted = binary_frame(b"\x01first");
        let payload_index = 4;
        corrupted[payload_index] ^= 0xff;

        let mut assembler = Assembler::new(binary_framing());
        assembler.push(&corrupted);
        assembler.push(&binary_frame(b"\x01second"));

        assert!(matches!(
            assembler.next_frame(),
            Err(FramingError::ChecksumMismatch { .. })
        ));

        // the connection keeps going: the next frame is intact
        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x01second");
    }

    #[test]
    fn oversized_length_discards_the_buffer() {
        let mut assembler = Assembler::new(binary_framing());
        assembler.push(&[0x78, 0x78, 0xff, 0x01, 0x02]);

        assert!(matches!(
            assembler.next_frame(),
            Err(FramingError::Oversized { .. })
        ));
        assert_eq!(assembler.buffered(), 0);

        // and the connection is still usable afterwards
        assembler.push(&binary_frame(b"\x01after"));
        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x01after");
    }

    #[test]
    fn garbage_before_header_is_skipped() {
        let mut assembler = Assembler::new(binary_framing());
        let mut wire = vec![0x00, 0x13, 0x9a];
        wire.extend_from_slice(&binary_frame(b"\x01x"));
        assembler.push(&wire);

        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"\x01x");
    }

    fn text_framing() -> Framing {
        Framing::Delimited(Delimited {
            start: Some(b'*'),
            end: b"#",
            max_frame_length: 128,
        })
    }

    #[test]
    fn delimited_frames_back_to_back() {
        let mut assembler = Assembler::new(text_framing());
        assembler.push(b"*HQ,ONE#*HQ,TWO#");

        let first = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&first.payload[..], b"HQ,ONE");
        let second = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&second.payload[..], b"HQ,TWO");
        assert!(assembler.next_frame().unwrap().is_none());
    }

    #[test]
    fn delimited_waits_for_the_terminator() {
        let mut assembler = Assembler::new(text_framing());
        assembler.push(b"*HQ,PART");
        assert!(assembler.next_frame().unwrap().is_none());

        assembler.push(b"IAL#");
        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"HQ,PARTIAL");
    }

    #[test]
    fn delimited_skips_garbage_before_start() {
        let mut assembler = Assembler::new(text_framing());
        assembler.push(b"\r\nnoise*HQ,OK#");

        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"HQ,OK");
    }

    #[test]
    fn delimiter_overrun_discards_the_buffer() {
        let mut assembler = Assembler::new(text_framing());
        assembler.push(b"*");
        assembler.push(&[b'x'; 200]);

        assert!(matches!(
            assembler.next_frame(),
            Err(FramingError::DelimiterOverrun { .. })
        ));
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn single_shot_applies_the_same_validation() {
        let wire = binary_frame(b"\x01datagram");
        let frame = single_shot(&binary_framing(), &wire).unwrap();
        assert_eq!(&frame.payload[..], b"\x01datagram");

        assert!(matches!(
            single_shot(&binary_framing(), &wire[..5]),
            Err(FramingError::Truncated)
        ));
    }

    #[test]
    fn encoded_replies_round_trip_through_the_assembler() {
        let framing = binary_framing();
        let wire = framing.encode(b"\x01ack");
        let frame = single_shot(&framing, &wire).unwrap();
        assert_eq!(&frame.payload[..], b"\x01ack");
        assert_eq!(frame.checksum_valid, Some(true));

        let text = text_framing();
        let wire = text.encode(b"HQ,reply");
        let frame = single_shot(&text, &wire).unwrap();
        assert_eq!(&frame.payload[..], b"HQ,reply");
    }

    #[test]
    fn single_shot_raw_passes_the_body_through() {
        let frame = single_shot(
            &Framing::Raw {
                max_frame_length: 64,
            },
            b"id=1&lat=2",
        )
        .unwrap();
        assert_eq!(&frame.payload[..], b"id=1&lat=2");
        assert_eq!(frame.checksum_valid, None);
    }
}
