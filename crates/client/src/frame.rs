//! Length-prefixed framing used on the upstream connection.
//!
//! A frame is `u16 length | u16 transaction id | payload` where `length`
//! counts the id and the payload. Since the payload is a DNS message without
//! its own id, every frame is also a valid RFC 7858 message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Largest DNS message that fits in one frame.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

const READ_RESERVE: usize = 4096;

/// Frame `message` under transaction id `id`, dropping the message's own id.
pub fn encode_frame(id: u16, message: &[u8]) -> Result<Bytes, FrameError> {
    if message.len() < 2 {
        return Err(FrameError::TooShort(message.len()));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(FrameError::TooLarge(message.len()));
    }

    let mut buf = BytesMut::with_capacity(message.len() + 2);
    buf.put_u16(message.len() as u16);
    buf.put_u16(id);
    buf.extend_from_slice(&message[2..]);
    Ok(buf.freeze())
}

/// A complete frame sliced out of the stream.
#[derive(Debug)]
pub struct Frame {
    pub id: u16,
    /// Id followed by payload, i.e. a whole DNS message.
    body: BytesMut,
}

impl Frame {
    /// The framed DNS message with its id replaced by `id`.
    pub fn into_message(mut self, id: u16) -> Bytes {
        self.body[..2].copy_from_slice(&id.to_be_bytes());
        self.body.freeze()
    }
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer to read into, with room reserved for the next read.
    pub fn read_buf(&mut self) -> &mut BytesMut {
        self.buf.reserve(READ_RESERVE);
        &mut self.buf
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Slice out the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if len < 2 {
            return Err(FrameError::TooShort(len));
        }
        if self.buf.len() < len + 2 {
            return Ok(None);
        }

        self.buf.advance(2);
        let body = self.buf.split_to(len);
        let id = u16::from_be_bytes([body[0], body[1]]);
        Ok(Some(Frame { id, body }))
    }
}
