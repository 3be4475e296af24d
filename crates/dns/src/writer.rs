use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DnsError;

/// Largest DNS message that fits a 16-bit length prefix.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

pub struct DnsMessageWriter {
    buf: BytesMut,
    max_len: usize,
}

impl Default for DnsMessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsMessageWriter {
    /// Create a new DNS message writer with a custom maximum length.
    pub fn new_with_max(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_len.min(512)), // 512 is min dns message payload size.
            max_len,
        }
    }

    /// Create a new DNS message writer bounded by the largest length-prefixed message.
    pub fn new() -> Self {
        Self::new_with_max(MAX_MESSAGE_LEN)
    }

    #[inline]
    fn ensure_space(&mut self, need: usize, what: &'static str) -> Result<(), DnsError> {
        let new_len = self
            .buf
            .len()
            .checked_add(need)
            .ok_or(DnsError::Overflow(what))?;
        if new_len > self.max_len {
            return Err(DnsError::Overflow(what));
        }
        self.buf.reserve(need);
        Ok(())
    }

    /// Write a u8 to the buffer.
    pub fn write_u8(&mut self, value: u8) -> Result<(), DnsError> {
        self.ensure_space(std::mem::size_of::<u8>(), "u8")?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Write a u16 to the buffer.
    pub fn write_u16(&mut self, value: u16) -> Result<(), DnsError> {
        self.ensure_space(std::mem::size_of::<u16>(), "u16")?;
        self.buf.put_u16(value);
        Ok(())
    }

    /// Write a u32 to the buffer.
    pub fn write_u32(&mut self, value: u32) -> Result<(), DnsError> {
        self.ensure_space(std::mem::size_of::<u32>(), "u32")?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Write raw bytes to the buffer.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), DnsError> {
        self.ensure_space(data.len(), "raw bytes")?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Get the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Trait for types that can be serialized into a DNS message.
pub trait DnsWritable {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> Result<(), DnsError>;
}
