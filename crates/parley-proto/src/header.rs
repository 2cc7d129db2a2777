//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 4-byte big-endian payload length. It is cast
//! directly from network bytes; every 4-byte pattern is a structurally valid
//! header, and the size limit is checked separately.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 4-byte frame header (Big Endian network byte order).
///
/// Stored as a raw byte array so the struct has alignment 1 and can be cast
/// from any offset of a receive buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header (4 bytes).
    pub const SIZE: usize = 4;

    /// Maximum payload size (64 KiB). Chat lines are short; anything larger is
    /// a broken or hostile client.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Header for a payload of `payload` bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn for_payload(payload: &[u8]) -> Result<Self> {
        let too_large =
            || ProtocolError::PayloadTooLarge { size: payload.len(), max: Self::MAX_PAYLOAD_SIZE as usize };

        let len = u32::try_from(payload.len()).map_err(|_| too_large())?;
        if len > Self::MAX_PAYLOAD_SIZE {
            return Err(too_large());
        }

        Ok(Self { payload_size: len.to_be_bytes() })
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// Returns `Ok(None)` if fewer than [`Self::SIZE`] bytes are available,
    /// which is the normal state of a partially received frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the declared payload size
    ///   exceeds the maximum. Checked before any payload is buffered.
    pub fn from_prefix(bytes: &[u8]) -> Result<Option<&Self>> {
        let Ok((header, _rest)) = Self::ref_from_prefix(bytes) else {
            return Ok(None);
        };

        let payload_size = header.payload_size();
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(Some(header))
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Total frame length (header plus payload).
    #[must_use]
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.payload_size() as usize
    }
}
