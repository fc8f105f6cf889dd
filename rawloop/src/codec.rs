//! Envelope codec over a [`CodecStream`].
//!
//! Frame format: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload for integrity verification
//! - **payload**: One serialized envelope
//!
//! The [`EnvelopeCodec`] trait is the seam the transport consumes; bring a
//! different implementation to change the payload serialization. The default
//! [`JsonEnvelopeCodec`] keeps payloads human-readable, which is what you
//! want in a measurement harness.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::buffer::{CodecStream, StreamError};
use crate::envelope::{CallEnvelope, ReplyEnvelope};

/// Frame header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to serialize an envelope payload.
    #[error("encode failed: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to deserialize an envelope payload.
    #[error("decode failed: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Checksum verification failed, the frame was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// Length field smaller than the header itself.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The bad length value from the header.
        length: u32,
    },

    /// The serialized envelope does not fit in the shared buffer.
    #[error("frame of {size} bytes exceeds buffer capacity {capacity}")]
    FrameTooLarge {
        /// Total frame size that was requested.
        size: usize,
        /// Capacity of the buffer the stream cursors over.
        capacity: usize,
    },

    /// The underlying stream ran out of bytes or was misused.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Envelope serialization consumed by the loopback transport.
///
/// All four operations work against a [`CodecStream`] positioned by the
/// caller; the service side uses `decode_call`/`encode_reply`, the client
/// side of the harness uses the other pair.
pub trait EnvelopeCodec {
    /// Write a call envelope at the stream's current position.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if serialization fails or the frame does not fit.
    fn encode_call(&self, stream: &mut CodecStream, call: &CallEnvelope) -> Result<(), CodecError>;

    /// Read a call envelope from the stream's current position.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` on truncated, corrupted, or malformed frames.
    fn decode_call(&self, stream: &mut CodecStream) -> Result<CallEnvelope, CodecError>;

    /// Write a reply envelope at the stream's current position.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if serialization fails or the frame does not fit.
    fn encode_reply(
        &self,
        stream: &mut CodecStream,
        reply: &ReplyEnvelope,
    ) -> Result<(), CodecError>;

    /// Read a reply envelope from the stream's current position.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` on truncated, corrupted, or malformed frames.
    fn decode_reply(&self, stream: &mut CodecStream) -> Result<ReplyEnvelope, CodecError>;
}

/// JSON envelope codec using serde_json payloads with CRC32C framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeCodec;

impl JsonEnvelopeCodec {
    fn write_frame<T: Serialize>(
        &self,
        stream: &mut CodecStream,
        value: &T,
    ) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(value).map_err(|e| CodecError::Encode(Box::new(e)))?;

        let capacity = stream.buffer().borrow().capacity();
        let total = FRAME_HEADER_SIZE + payload.len();
        if total > capacity {
            return Err(CodecError::FrameTooLarge {
                size: total,
                capacity,
            });
        }

        let checksum = crc32c::crc32c(&payload);
        stream.write_bytes(&(total as u32).to_le_bytes())?;
        stream.write_bytes(&checksum.to_le_bytes())?;
        stream.write_bytes(&payload)?;
        Ok(())
    }

    fn read_frame<T: DeserializeOwned>(&self, stream: &mut CodecStream) -> Result<T, CodecError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        stream.read_bytes(&mut header)?;

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if (length as usize) < FRAME_HEADER_SIZE {
            return Err(CodecError::InvalidLength { length });
        }

        // Bound the length against the bytes actually there before
        // allocating; the field is untrusted and a corrupted header must not
        // drive the allocation.
        let payload_len = length as usize - FRAME_HEADER_SIZE;
        if payload_len > stream.remaining() {
            return Err(CodecError::FrameTooLarge {
                size: length as usize,
                capacity: stream.buffer().borrow().capacity(),
            });
        }

        let mut payload = vec![0u8; payload_len];
        stream.read_bytes(&mut payload)?;

        let actual = crc32c::crc32c(&payload);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        serde_json::from_slice(&payload).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

impl EnvelopeCodec for JsonEnvelopeCodec {
    fn encode_call(&self, stream: &mut CodecStream, call: &CallEnvelope) -> Result<(), CodecError> {
        self.write_frame(stream, call)
    }

    fn decode_call(&self, stream: &mut CodecStream) -> Result<CallEnvelope, CodecError> {
        self.read_frame(stream)
    }

    fn encode_reply(
        &self,
        stream: &mut CodecStream,
        reply: &ReplyEnvelope,
    ) -> Result<(), CodecError> {
        self.write_frame(stream, reply)
    }

    fn decode_reply(&self, stream: &mut CodecStream) -> Result<ReplyEnvelope, CodecError> {
        self.read_frame(stream)
    }
}
