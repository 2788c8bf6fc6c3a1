//! Length-prefixed JSON framing
//!
//! Frame format:
//! ```text
//! +---------------+------------------+
//! | length        | payload          |
//! | (4 bytes, BE) | (JSON document)  |
//! +---------------+------------------+
//! ```
//!
//! Frames are self-describing JSON objects, so there is no type byte; the
//! payload's keys identify the frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::io::{self, Cursor};

/// Frame header size: 4-byte big-endian payload length
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum frame payload size (64 KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Encode a frame payload with its length prefix
pub fn encode<T: Serialize>(payload: &T) -> io::Result<Bytes> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame payload too large: {} bytes (max: {})",
                body.len(),
                MAX_FRAME_SIZE
            ),
        ));
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Frame decoder for streaming use
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame payload
    /// Returns Ok(Some(payload)) if successful, Ok(None) if more data needed
    pub fn decode_next(&mut self) -> io::Result<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the length without consuming
        let mut cursor = Cursor::new(&self.buffer[..]);
        let payload_len = cursor.get_u32() as usize;

        if payload_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, MAX_FRAME_SIZE
                ),
            ));
        }

        let total_size = FRAME_HEADER_SIZE + payload_len;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(payload_len).freeze()))
    }

    /// Get the current buffer length
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::{ClientAction, ServerFrame};

    #[test]
    fn test_encode_decode_roundtrip() {
        let action = ClientAction::Join {
            room: "general".to_string(),
        };
        let encoded = encode(&action).unwrap();

        let mut codec = FrameCodec::new();
        codec.feed(&encoded);

        let payload = codec.decode_next().unwrap().unwrap();
        let decoded: ClientAction = serde_json::from_slice(&payload).unwrap();
        assert_eq!(action, decoded);
        assert!(codec.decode_next().unwrap().is_none());
    }

    #[test]
    fn test_streaming_reassembly() {
        let frame1 = encode(&ServerFrame::info("Room created")).unwrap();
        let frame2 = encode(&ServerFrame::info("Joined room")).unwrap();

        let mut data = BytesMut::new();
        data.extend_from_slice(&frame1);
        data.extend_from_slice(&frame2);

        let mut codec = FrameCodec::new();

        // Feed a partial header first
        codec.feed(&data[..3]);
        assert!(codec.decode_next().unwrap().is_none());

        // Feed the rest and expect both frames back
        codec.feed(&data[3..]);

        let first: ServerFrame =
            serde_json::from_slice(&codec.decode_next().unwrap().unwrap()).unwrap();
        let second: ServerFrame =
            serde_json::from_slice(&codec.decode_next().unwrap().unwrap()).unwrap();

        assert_eq!(first, ServerFrame::info("Room created"));
        assert_eq!(second, ServerFrame::info("Joined room"));
        assert!(codec.decode_next().unwrap().is_none());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_frame_too_large() {
        let mut data = BytesMut::new();
        data.put_u32((MAX_FRAME_SIZE + 1) as u32);

        let mut codec = FrameCodec::new();
        codec.feed(&data);
        assert!(codec.decode_next().is_err());
    }

    #[test]
    fn test_clear_discards_partial_frame() {
        let frame = encode(&ServerFrame::info("x")).unwrap();
        let mut codec = FrameCodec::new();
        codec.feed(&frame[..frame.len() - 1]);
        assert!(codec.buffered_len() > 0);

        codec.clear();
        assert_eq!(codec.buffered_len(), 0);
        assert!(codec.decode_next().unwrap().is_none());
    }
}
