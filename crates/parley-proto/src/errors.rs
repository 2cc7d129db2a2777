//! Protocol error types.

use thiserror::Error;

/// Result alias for framing operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
///
/// Every variant is fatal for the connection that produced it: once a length
/// prefix is wrong there is no way to resynchronise the byte stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared or actual payload exceeds [`crate::FrameHeader::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size in bytes
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Buffer ended before the declared payload was complete.
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header declared
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Underlying stream failed (blocking helpers only).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the peer closed the stream cleanly between frames.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
