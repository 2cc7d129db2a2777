//! Fuzz target for FrameDecoder
//!
//! Feeds arbitrary bytes to the incremental decoder in arbitrary chunk sizes
//! to find:
//! - Parser crashes or panics
//! - Integer overflows in length calculations
//! - Frames reassembled differently depending on how the stream was split
//!
//! The fuzzer should NEVER panic. Invalid input must surface as an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{FrameDecoder, FrameHeader};

fn decode_all(chunks: &[&[u8]]) -> (Vec<bytes::Bytes>, bool) {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        decoder.extend(chunk);
        loop {
            match decoder.decode() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(_) => return (frames, true),
            }
        }
    }
    (frames, false)
}

fuzz_target!(|input: (u8, &[u8])| {
    let (split, data) = input;

    let (whole, whole_failed) = decode_all(&[data]);

    let step = usize::from(split).max(1);
    let chunks: Vec<&[u8]> = data.chunks(step).collect();
    let (pieces, pieces_failed) = decode_all(&chunks);

    // Chunking must not change the outcome
    assert_eq!(whole, pieces);
    assert_eq!(whole_failed, pieces_failed);

    for frame in &whole {
        assert!(frame.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize);
    }
});
