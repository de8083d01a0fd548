//! Wire framing for the broker transport.
//!
//! Every frame on the wire is `[flags: u8][len: u32 BE][payload]`. Flag bit
//! 0 (`MORE`) marks a continuation frame of a multipart message; all other
//! flag bits are reserved and must be zero. The transport never
//! interoperates with foreign peers, so there is no handshake or version
//! negotiation: a connection speaks frames from its first byte.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// MORE flag: the frame is not the last one of its message.
pub const FLAG_MORE: u8 = 0x01;

/// Length of the fixed frame header (flags byte + u32 length).
pub const HEADER_LEN: usize = 5;

/// Wire framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Protocol violation: reserved flag bits set ({0:#04x})")]
    ReservedBits(u8),

    #[error("Protocol violation: frame of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },
}

/// Result type alias for framing operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// A decoded wire frame
#[derive(Debug, Clone)]
pub struct WireFrame {
    pub flags: u8,
    pub payload: Bytes,
}

impl WireFrame {
    /// Create a data frame.
    pub const fn data(payload: Bytes, more: bool) -> Self {
        let flags = if more { FLAG_MORE } else { 0 };
        Self { flags, payload }
    }

    #[inline]
    pub const fn more(&self) -> bool {
        (self.flags & FLAG_MORE) != 0
    }

    /// Append the encoded frame to `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        out.extend_from_slice(&[self.flags]);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
    }
}

/// Stateful frame decoder.
///
/// The caller accumulates inbound bytes in a single `BytesMut`; `decode`
/// consumes exactly one frame per call when enough bytes are buffered and
/// leaves the buffer untouched otherwise, so fragmented input needs no
/// separate reassembly state.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode a single frame from `src`.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` → frame decoded, bytes consumed
    /// - `Ok(None)` → need more data, nothing consumed
    /// - `Err` → protocol violation; the connection must be dropped
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireFrame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let flags = src[0];
        if (flags & !FLAG_MORE) != 0 {
            return Err(FrameError::ReservedBits(flags));
        }

        let body_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if body_len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: body_len,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_LEN + body_len {
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(body_len).freeze();
        Ok(Some(WireFrame { flags, payload }))
    }
}

/// Encode a multipart message into `out`.
///
/// Sets `MORE` on every frame except the last. An empty message encodes a
/// single empty frame so that the peer's assembler always sees a complete
/// message boundary.
pub fn encode_frames(frames: &[Bytes], out: &mut BytesMut) {
    if frames.is_empty() {
        WireFrame::data(Bytes::new(), false).encode_into(out);
        return;
    }
    let last = frames.len() - 1;
    for (i, payload) in frames.iter().enumerate() {
        WireFrame::data(payload.clone(), i < last).encode_into(out);
    }
}
