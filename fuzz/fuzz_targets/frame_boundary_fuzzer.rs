//! Fuzz target for frame length boundary conditions
//!
//! Prevent memory exhaustion via oversized length prefixes.
//!
//! # Strategy
//!
//! - Payload size: zero, small, at-max, just-over-max, way-over-max, u32::MAX
//! - Body: shorter than, equal to, or longer than the declared size
//!
//! # Invariants
//!
//! - A declared size above `MAX_PAYLOAD_SIZE` MUST return
//!   `ProtocolError::PayloadTooLarge` as soon as the header is visible
//! - A complete frame MUST decode to exactly the declared number of bytes
//! - A truncated frame MUST be reported by `finish`, never decoded

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{FrameDecoder, FrameHeader, ProtocolError};

const MAX: u32 = FrameHeader::MAX_PAYLOAD_SIZE;

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMaxBoundary,
    JustOverMax,
    WayOverMax,
    MaxU32,
    Random(u32),
}

impl PayloadSize {
    fn value(&self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::Small(n) => u32::from(*n),
            Self::AtMaxBoundary => MAX,
            Self::JustOverMax => MAX + 1,
            Self::WayOverMax => MAX * 16,
            Self::MaxU32 => u32::MAX,
            Self::Random(n) => *n,
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    declared: PayloadSize,
    body: Vec<u8>,
}

fuzz_target!(|frame: BoundaryFrame| {
    let declared = frame.declared.value();

    let mut decoder = FrameDecoder::new();
    decoder.extend(&declared.to_be_bytes());
    decoder.extend(&frame.body);

    match decoder.decode() {
        Err(ProtocolError::PayloadTooLarge { size, max }) => {
            assert!(declared > MAX);
            assert_eq!(size as u64, u64::from(declared));
            assert_eq!(max as u64, u64::from(MAX));
        },
        Err(e) => panic!("unexpected error: {e}"),
        Ok(Some(payload)) => {
            assert!(declared <= MAX);
            assert_eq!(payload.len(), declared as usize);
            assert_eq!(&payload[..], &frame.body[..declared as usize]);
        },
        Ok(None) => {
            assert!(declared <= MAX);
            assert!(frame.body.len() < declared as usize);
            assert!(decoder.finish().is_err());
        },
    }
});
