//! Frame encoding and incremental decoding.
//!
//! The server reads from non-blocking sockets, so a frame may arrive split
//! across any number of reads. [`FrameDecoder`] accumulates raw bytes and
//! yields whole payloads once they are complete. Clients and tests that use
//! blocking streams can use [`read_frame`] and [`write_frame`] instead.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Size of the scratch buffer used by [`FrameDecoder::read_from`].
const READ_CHUNK: usize = 4096;

/// Append one framed payload to `dst`.
///
/// Writes: `[length (4 bytes, BE)] + [payload]`
///
/// # Errors
///
/// - `ProtocolError::PayloadTooLarge` if the payload exceeds
///   [`FrameHeader::MAX_PAYLOAD_SIZE`]. Nothing is written in that case.
pub fn encode_frame(payload: &[u8], dst: &mut impl BufMut) -> Result<()> {
    let header = FrameHeader::for_payload(payload)?;
    dst.put_slice(&header.to_bytes());
    dst.put_slice(payload);
    Ok(())
}

/// Write one framed payload to a blocking writer and flush it.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    encode_frame(payload, &mut buf)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed payload from a blocking reader.
///
/// A stream that closes cleanly before or inside a frame yields
/// `ProtocolError::Io` with kind `UnexpectedEof` (see
/// [`ProtocolError::is_eof`]).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Bytes> {
    let mut len_buf = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut len_buf)?;

    let Some(header) = FrameHeader::from_prefix(&len_buf)? else {
        return Err(ProtocolError::FrameTruncated { expected: FrameHeader::SIZE, actual: len_buf.len() });
    };

    let mut payload = vec![0u8; header.payload_size() as usize];
    reader.read_exact(&mut payload)?;
    Ok(Bytes::from(payload))
}

/// Incremental frame decoder.
///
/// # Invariants
///
/// - The internal buffer always starts at a frame boundary.
/// - An oversized length prefix is reported as soon as the 4 header bytes are
///   visible, before any payload is buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull whatever bytes `reader` has ready into the buffer.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the peer closed the
    /// stream. For non-blocking readers, `WouldBlock` is passed through
    /// unchanged so the caller can tell "nothing yet" from a failure.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk)?;
        self.extend(&chunk[..n]);
        Ok(n)
    }

    /// Decode the next complete payload, if one is buffered.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the next frame declares an
    ///   oversized payload. The decoder is unusable afterwards.
    pub fn decode(&mut self) -> Result<Option<Bytes>> {
        let Some(header) = FrameHeader::from_prefix(&self.buf)? else {
            return Ok(None);
        };

        let frame_len = header.frame_len();
        if self.buf.len() < frame_len {
            self.buf.reserve(frame_len - self.buf.len());
            return Ok(None);
        }

        let mut frame = self.buf.split_to(frame_len);
        frame.advance(FrameHeader::SIZE);
        Ok(Some(frame.freeze()))
    }

    /// Bytes buffered but not yet returned as a payload.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Fail if the stream ended in the middle of a frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTruncated` if a partial frame is buffered.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let expected = match FrameHeader::from_prefix(&self.buf)? {
            Some(header) => header.payload_size() as usize,
            None => FrameHeader::SIZE,
        };
        Err(ProtocolError::FrameTruncated {
            expected,
            actual: self.buf.len().saturating_sub(FrameHeader::SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let mut wire = Vec::new();
        for payload in payloads {
            encode_frame(payload, &mut wire).expect("should encode");
        }
        wire
    }

    proptest! {
        #[test]
        fn decoder_reassembles_any_split(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8),
            split_points in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
            let wire = framed(&refs);

            let mut cuts: Vec<usize> = split_points.iter().map(|i| i.index(wire.len() + 1)).collect();
            cuts.push(0);
            cuts.push(wire.len());
            cuts.sort_unstable();
            cuts.dedup();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for window in cuts.windows(2) {
                decoder.extend(&wire[window[0]..window[1]]);
                while let Some(payload) = decoder.decode().expect("valid stream") {
                    decoded.push(payload.to_vec());
                }
            }

            prop_assert_eq!(decoded, payloads);
            prop_assert_eq!(decoder.buffered_len(), 0);
        }
    }

    #[test]
    fn decode_waits_for_full_payload() {
        let wire = framed(&[b"hello"]);
        let mut decoder = FrameDecoder::new();

        decoder.extend(&wire[..6]);
        assert!(decoder.decode().unwrap().is_none());

        decoder.extend(&wire[6..]);
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn decode_empty_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&framed(&[b""]));
        assert_eq!(decoder.decode().unwrap().unwrap().len(), 0);
    }

    #[test]
    fn decode_rejects_oversized_header_early() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&(FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        assert!(matches!(decoder.decode(), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn finish_reports_truncated_frame() {
        let wire = framed(&[b"abcdef"]);
        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..7]);
        assert!(decoder.decode().unwrap().is_none());

        let err = decoder.finish().unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTruncated { expected: 6, actual: 3 }));
    }

    #[test]
    fn read_from_pulls_available_bytes() {
        let wire = framed(&[b"one", b"two"]);
        let mut cursor = Cursor::new(wire.clone());
        let mut decoder = FrameDecoder::new();

        let n = decoder.read_from(&mut cursor).unwrap();
        assert_eq!(n, wire.len());
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"two"));
        assert_eq!(decoder.read_from(&mut cursor).unwrap(), 0);
    }

    #[test]
    fn blocking_helpers_round_trip_sequence() {
        let mut wire = Vec::new();
        for msg in ["first", "second", "third"] {
            write_frame(&mut wire, msg.as_bytes()).unwrap();
        }

        let mut cursor = Cursor::new(wire);
        for expected in ["first", "second", "third"] {
            assert_eq!(read_frame(&mut cursor).unwrap(), expected.as_bytes());
        }
        assert!(read_frame(&mut cursor).unwrap_err().is_eof());
    }

    #[test]
    fn write_frame_rejects_oversized() {
        let big = vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1];
        let mut wire = Vec::new();
        assert!(matches!(write_frame(&mut wire, &big), Err(ProtocolError::PayloadTooLarge { .. })));
        assert!(wire.is_empty());
    }
}
