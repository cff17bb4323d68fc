//! Video frame reassembly and decoding
//!
//! The vehicle sends each frame as raw bytes immediately followed by a
//! fixed ASCII end marker, then blocks until the surface acknowledges the
//! frame. `FrameBuffer` accumulates the byte stream and recognises
//! complete frames; `Frame` is the decoded image payload.

use crate::error::{RovError, RovResult};
use crate::protocol::FRAME_END_MARKER;

/// Decoded video frame: header-prefixed raw pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Header length: width and height as big-endian u32, channel count
    pub const HEADER_LEN: usize = 9;

    /// Decode a frame from the bytes preceding the end marker
    pub fn from_bytes(payload: &[u8]) -> RovResult<Self> {
        if payload.len() < Self::HEADER_LEN {
            return Err(RovError::Frame(format!(
                "payload too short for header: {} bytes",
                payload.len()
            )));
        }
        let width = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let height = u32::from_be_bytes(payload[4..8].try_into().unwrap());
        let channels = payload[8];

        // Header fields come straight off the wire; an implausible size
        // must surface as a frame error, not an overflow
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or_else(|| {
                RovError::Frame(format!(
                    "implausible header: {}x{}x{}",
                    width, height, channels
                ))
            })?;
        let data = &payload[Self::HEADER_LEN..];
        if data.len() != expected {
            return Err(RovError::Frame(format!(
                "size mismatch: {}x{}x{} needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data: data.to_vec(),
        })
    }

    /// Encode the frame for transmission (header followed by pixel data)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.data.len());
        bytes.extend_from_slice(&self.width.to_be_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.push(self.channels);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// Accumulates the raw video byte stream and splits out complete frames.
///
/// Owned exclusively by one video channel; reset to empty the moment a
/// full frame is recognised, so no byte of an emitted frame is retained.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes to the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// If the buffered stream ends with the frame marker, take the frame
    /// payload (everything before the marker) and reset the buffer.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < FRAME_END_MARKER.len() || !self.buf.ends_with(FRAME_END_MARKER) {
            return None;
        }
        let payload = self.buf[..self.buf.len() - FRAME_END_MARKER.len()].to_vec();
        self.buf.clear();
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame {
            width: 4,
            height: 3,
            channels: 2,
            data: (0u8..24).collect(),
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = test_frame();
        let decoded = Frame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_frame_rejects_size_mismatch() {
        let mut bytes = test_frame().to_bytes();
        bytes.pop();
        assert!(Frame::from_bytes(&bytes).is_err());
        assert!(Frame::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_rejects_overflowing_header() {
        // A corrupt header whose dimension product overflows usize must
        // decode to an error, never wrap around and match a tiny payload
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.push(255);
        bytes.extend_from_slice(&[0u8; 16]);

        assert!(matches!(Frame::from_bytes(&bytes), Err(RovError::Frame(_))));
    }

    #[test]
    fn test_single_receive_reassembly() {
        let frame = test_frame();
        let mut stream = frame.to_bytes();
        stream.extend_from_slice(FRAME_END_MARKER);

        let mut buffer = FrameBuffer::new();
        buffer.extend(&stream);
        let payload = buffer.take_frame().expect("frame should complete");
        assert_eq!(Frame::from_bytes(&payload).unwrap(), frame);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_split_reassembly_matches_single() {
        // Any byte-wise split of payload + marker must reconstruct the
        // same frame, and leave the buffer empty afterwards.
        let frame = test_frame();
        let mut stream = frame.to_bytes();
        stream.extend_from_slice(FRAME_END_MARKER);

        for chunk_size in 1..stream.len() {
            let mut buffer = FrameBuffer::new();
            let mut emitted = None;
            for chunk in stream.chunks(chunk_size) {
                buffer.extend(chunk);
                if let Some(payload) = buffer.take_frame() {
                    assert!(emitted.is_none(), "frame emitted twice");
                    emitted = Some(payload);
                }
            }
            let payload = emitted.expect("frame never completed");
            assert_eq!(Frame::from_bytes(&payload).unwrap(), frame);
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(FRAME_END_MARKER);
        let payload = buffer.take_frame().expect("marker alone completes a frame");
        assert!(payload.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_incomplete_stream_yields_nothing() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&test_frame().to_bytes());
        assert!(buffer.take_frame().is_none());
        assert!(!buffer.is_empty());
    }
}
