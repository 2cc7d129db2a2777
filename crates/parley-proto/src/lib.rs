//! Wire framing for the Parley chat protocol.
//!
//! Every logical message on a Parley connection is a frame: a 4-byte
//! big-endian payload length followed by that many bytes of UTF-8 text.
//! Framing is format-agnostic; interpretation of the text (chat lines and
//! slash commands) lives in the server.
//!
//! # Components
//!
//! - [`FrameHeader`]: fixed 4-byte length prefix, parsed zero-copy
//! - [`FrameDecoder`]: incremental decoder for non-blocking readers
//! - [`encode_frame`]: append a framed payload to any [`bytes::BufMut`]
//! - [`read_frame`] / [`write_frame`]: blocking helpers over `std::io`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod errors;
mod header;

pub use codec::{FrameDecoder, encode_frame, read_frame, write_frame};
pub use errors::{ProtocolError, Result};
pub use header::FrameHeader;

/// Decode a frame payload as text.
///
/// Invalid UTF-8 sequences are replaced with U+FFFD rather than rejected, so
/// a misbehaving client degrades to garbled text instead of a disconnect.
pub fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
