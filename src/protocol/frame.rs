//! Frame assembly over a fragmented byte stream.
//!
//! Socket reads are fed in as they arrive; complete frames come out. A read may hold
//! part of a frame (even part of its length prefix), exactly one frame, or several
//! frames back to back, and all three are handled the same way.
use bytes::{BufMut, Bytes, BytesMut};
use log::{trace, warn};

use crate::cursor::Cursor;

use super::ProtocolError;

/// Length prefix size.
pub const HEADER_SIZE: usize = 4;
/// Largest frame accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Protocol version byte of a classic MySQL greeting. Read as an X Protocol frame, it
/// lands where the type tag would be.
const LEGACY_GREETING_TAG: u8 = 0x0a;

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Bytes covered by the length prefix: tag plus payload.
    pub length: u32,
    pub type_tag: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(type_tag: u8, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            length: payload.len() as u32 + 1,
            type_tag,
            payload,
        }
    }

    /// Wire representation of this frame.
    pub fn encode(&self) -> Bytes {
        encode_frame(self.type_tag, &self.payload)
    }
}

/// Builds `[length][tag][payload]` for an outbound message.
pub fn encode_frame(type_tag: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 1 + payload.len());
    buf.put_u32_le(payload.len() as u32 + 1);
    buf.put_u8(type_tag);
    buf.put_slice(payload);
    buf.freeze()
}

/// Accumulates inbound bytes and cuts them into frames.
#[derive(Debug)]
pub struct FrameTransport {
    buffer: BytesMut,
    max_frame_size: usize,
    first_frame_seen: bool,
}

impl Default for FrameTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameTransport {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            max_frame_size,
            first_frame_seen: false,
        }
    }

    /// Appends freshly read socket bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        trace!("feed {} bytes: {}", bytes.len(), hex::encode(&bytes[..bytes.len().min(64)]));
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet returned as part of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Accumulator handed to `AsyncReadExt::read_buf`, skipping the copy [`feed`](Self::feed) makes.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the next complete frame, or `None` until one is fully buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = Cursor::new(&self.buffer[..HEADER_SIZE]).read_u32_le()?;

        // The tag is checked as soon as it is buffered so a classic server is
        // reported before waiting on a length that will never be satisfied.
        if !self.first_frame_seen
            && self.buffer.len() > HEADER_SIZE
            && self.buffer[HEADER_SIZE] == LEGACY_GREETING_TAG
        {
            warn!("peer greeted with the classic protocol");
            return Err(ProtocolError::NotXProtocol);
        }

        if length == 0 {
            return Err(ProtocolError::Violation(
                "frame length does not cover a type tag".to_string(),
            ));
        }
        if length as usize > self.max_frame_size {
            return Err(ProtocolError::Violation(format!(
                "frame of {length} bytes exceeds the {} byte limit",
                self.max_frame_size
            )));
        }

        let total = HEADER_SIZE + length as usize;
        if self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            return Ok(None);
        }

        self.first_frame_seen = true;
        let mut frame = self.buffer.split_to(total);
        let _ = frame.split_to(HEADER_SIZE);
        let type_tag = frame[0];
        let payload = frame.split_off(1).freeze();

        trace!("frame tag={type_tag} length={length}");
        Ok(Some(Frame {
            length,
            type_tag,
            payload,
        }))
    }

    /// Every complete frame currently buffered, in arrival order.
    pub fn drain(&mut self) -> Result<Vec<Frame>, ProtocolError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_byte_frame() -> Bytes {
        encode_frame(11, &[1, 2, 3, 4, 5])
    }

    #[test]
    fn encode_layout() {
        let frame = ten_byte_frame();
        assert_eq!(frame.len(), 10);
        assert_eq!(&frame[..], &[6, 0, 0, 0, 11, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn nothing_until_complete() {
        let mut transport = FrameTransport::default();
        transport.feed(&ten_byte_frame()[..9]);
        assert_eq!(transport.next_frame().unwrap(), None);
        assert_eq!(transport.pending(), 9);
    }

    #[test]
    fn split_in_two_halves() {
        let bytes = ten_byte_frame();

        let mut whole = FrameTransport::default();
        whole.feed(&bytes);
        let expected = whole.drain().unwrap();

        let mut split = FrameTransport::default();
        split.feed(&bytes[..5]);
        assert!(split.drain().unwrap().is_empty());
        split.feed(&bytes[5..]);
        let frames = split.drain().unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames, expected);
        assert_eq!(frames[0].type_tag, 11);
        assert_eq!(&frames[0].payload[..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn split_inside_length_prefix() {
        let bytes = ten_byte_frame();
        let mut transport = FrameTransport::default();
        for byte in bytes.iter() {
            assert!(transport.drain().unwrap().is_empty());
            transport.feed(&[*byte]);
        }
        let frames = transport.drain().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].length, 6);
    }

    #[test]
    fn coalesced_frames() {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&encode_frame(0, &[]));
        bytes.extend_from_slice(&encode_frame(13, b"row"));
        bytes.extend_from_slice(&encode_frame(14, &[]));
        bytes.extend_from_slice(&encode_frame(17, &[])[..3]);

        let mut transport = FrameTransport::default();
        transport.feed(&bytes);
        let tags: Vec<u8> = transport.drain().unwrap().iter().map(|f| f.type_tag).collect();
        assert_eq!(tags, vec![0, 13, 14]);
        assert_eq!(transport.pending(), 3);
    }

    #[test]
    #[should_panic(expected = "NotXProtocol")]
    fn classic_greeting() {
        let greeting = [0x4a, 0x00, 0x00, 0x00, 0x0a, b'8', b'.', b'0'];
        let mut transport = FrameTransport::default();
        transport.feed(&greeting);
        transport.next_frame().unwrap();
    }

    #[test]
    fn tag_ten_after_first_frame_is_not_a_greeting() {
        let mut transport = FrameTransport::default();
        transport.feed(&encode_frame(0, &[]));
        transport.feed(&encode_frame(LEGACY_GREETING_TAG, &[]));
        assert_eq!(transport.drain().unwrap().len(), 2);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn oversized_frame() {
        let mut transport = FrameTransport::new(16);
        transport.feed(&[0xff, 0x00, 0x00, 0x00, 0x01]);
        transport.next_frame().unwrap();
    }
}
