use crate::codec::WireFrame;
use bytes::Bytes;
use smallvec::SmallVec;
use thiserror::Error;

/// Errors produced by `MultipartAssembler`
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Multipart message exceeded frame count limit of {0}")]
    TooManyFrames(usize),

    #[error("Multipart message exceeded size limit of {0} bytes")]
    TooLarge(usize),
}

/// Collects wire frames until a complete multipart message is formed.
///
/// Invariants:
/// - Frames are appended in-order
/// - A message completes when `MORE == false`
/// - Limits are enforced eagerly to prevent DoS
///
/// Owned by a single connection read pump; not thread-safe by design.
pub struct MultipartAssembler {
    frames: SmallVec<[Bytes; 4]>,
    byte_count: usize,

    max_frames: usize,
    max_bytes: usize,
}

impl MultipartAssembler {
    /// Create a new assembler with limits.
    #[must_use]
    pub fn new(max_frames: usize, max_bytes: usize) -> Self {
        Self {
            frames: SmallVec::new(),
            byte_count: 0,
            max_frames,
            max_bytes,
        }
    }

    /// Push a decoded frame.
    ///
    /// Returns:
    /// - `Ok(None)` if the message is not complete yet
    /// - `Ok(Some(frames))` if a full message was assembled
    /// - `Err(AssembleError)` on a resource violation; the partial message
    ///   is discarded and the connection must be dropped
    pub fn push(&mut self, frame: WireFrame) -> Result<Option<Vec<Bytes>>, AssembleError> {
        if self.frames.len() + 1 > self.max_frames {
            self.reset();
            return Err(AssembleError::TooManyFrames(self.max_frames));
        }

        self.byte_count += frame.payload.len();
        if self.byte_count > self.max_bytes {
            self.reset();
            return Err(AssembleError::TooLarge(self.max_bytes));
        }

        let more = frame.more();
        self.frames.push(frame.payload);

        if more {
            Ok(None)
        } else {
            let msg = std::mem::take(&mut self.frames).into_vec();
            self.byte_count = 0;
            Ok(Some(msg))
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.frames.clear();
        self.byte_count = 0;
    }
}
