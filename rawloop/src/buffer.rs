//! Shared codec buffer and the cursor used to read and write it.
//!
//! The buffer is the "network" of the loopback transport: a fixed-capacity
//! byte region that the in-process client and the service side both address
//! through [`CodecStream`] cursors. Nothing is ever transmitted; encoding a
//! call into the buffer *is* the transmission.

use std::cell::RefCell;
use std::rc::Rc;

/// Capacity of the shared codec buffer in bytes.
///
/// Matches the largest datagram the transports being measured against would
/// carry, so codec cost is comparable.
pub const RAW_MESSAGE_SIZE: usize = 8800;

/// Errors raised by [`CodecStream`] byte operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A write would run past the end of the buffer.
    #[error("write of {requested} bytes exceeds remaining capacity {remaining}")]
    Overflow {
        /// Bytes the caller tried to write.
        requested: usize,
        /// Bytes left before the end of the buffer.
        remaining: usize,
    },

    /// A read would run past the end of the buffer.
    #[error("read of {requested} bytes exceeds remaining {remaining}")]
    Exhausted {
        /// Bytes the caller tried to read.
        requested: usize,
        /// Bytes left before the end of the buffer.
        remaining: usize,
    },

    /// The operation does not match the stream's current mode.
    #[error("stream is in {mode:?} mode")]
    WrongMode {
        /// The mode the stream was in.
        mode: StreamMode,
    },

    /// A position past the end of the buffer was requested.
    #[error("position {position} exceeds capacity {capacity}")]
    InvalidPosition {
        /// The requested position.
        position: usize,
        /// Buffer capacity.
        capacity: usize,
    },
}

/// Fixed-capacity byte buffer shared between client and service streams.
///
/// Allocated once when the registry populates its slot and kept for the
/// registry's whole lifetime; successive envelopes overwrite each other
/// starting at offset 0.
#[derive(Debug)]
pub struct CodecBuffer {
    data: Box<[u8]>,
}

impl CodecBuffer {
    /// Allocate a zeroed buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Read-only view of the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn write_at(&mut self, offset: usize, src: &[u8]) {
        self.data[offset..offset + src.len()].copy_from_slice(src);
    }

    fn read_at(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
    }
}

impl Default for CodecBuffer {
    fn default() -> Self {
        Self::new(RAW_MESSAGE_SIZE)
    }
}

/// Direction a [`CodecStream`] is currently operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Reading an envelope out of the buffer.
    Decode,
    /// Writing an envelope into the buffer.
    Encode,
}

/// Cursor over a [`CodecBuffer`] with a mode and a position.
///
/// The service transport resets its stream to position 0 at the start of
/// every decode and reply, so a round trip always reuses the same slot of
/// the buffer. Harnesses open their own stream over the shared buffer to
/// play the client side.
#[derive(Debug)]
pub struct CodecStream {
    buffer: Rc<RefCell<CodecBuffer>>,
    mode: StreamMode,
    position: usize,
}

impl CodecStream {
    /// Create a stream over `buffer` starting at position 0.
    pub fn new(buffer: Rc<RefCell<CodecBuffer>>, mode: StreamMode) -> Self {
        Self {
            buffer,
            mode,
            position: 0,
        }
    }

    /// The buffer this stream cursors over.
    pub fn buffer(&self) -> &Rc<RefCell<CodecBuffer>> {
        &self.buffer
    }

    /// Current mode.
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes between the position and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.borrow().capacity().saturating_sub(self.position)
    }

    /// Switch mode and rewind to position 0.
    ///
    /// Called at the start of every decode/reply cycle so each envelope
    /// fully overwrites the previous one.
    pub fn reset(&mut self, mode: StreamMode) {
        self.mode = mode;
        self.position = 0;
    }

    /// Move the cursor to an absolute position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `position` is past the end of the buffer.
    pub fn set_position(&mut self, position: usize) -> Result<(), StreamError> {
        let capacity = self.buffer.borrow().capacity();
        if position > capacity {
            return Err(StreamError::InvalidPosition { position, capacity });
        }
        self.position = position;
        Ok(())
    }

    /// Write `src` at the current position and advance.
    ///
    /// # Errors
    ///
    /// Returns `WrongMode` if the stream is in decode mode, `Overflow` if
    /// the write does not fit.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<(), StreamError> {
        if self.mode != StreamMode::Encode {
            return Err(StreamError::WrongMode { mode: self.mode });
        }
        let remaining = self.remaining();
        if src.len() > remaining {
            return Err(StreamError::Overflow {
                requested: src.len(),
                remaining,
            });
        }
        self.buffer.borrow_mut().write_at(self.position, src);
        self.position += src.len();
        Ok(())
    }

    /// Fill `dst` from the current position and advance.
    ///
    /// # Errors
    ///
    /// Returns `WrongMode` if the stream is in encode mode, `Exhausted` if
    /// fewer than `dst.len()` bytes remain.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), StreamError> {
        if self.mode != StreamMode::Decode {
            return Err(StreamError::WrongMode { mode: self.mode });
        }
        let remaining = self.remaining();
        if dst.len() > remaining {
            return Err(StreamError::Exhausted {
                requested: dst.len(),
                remaining,
            });
        }
        self.buffer.borrow().read_at(self.position, dst);
        self.position += dst.len();
        Ok(())
    }
}
