use crate::error::DnsError;

/// A reader for DNS messages that allows reading various components
pub struct DnsMessageReader<'a> {
    /// Internal buffer containing the DNS message.
    buffer: &'a [u8],
    /// Position in bytes.
    position: usize,
}

impl<'a> DnsMessageReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Seek to a position inside the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<(), DnsError> {
        let len = self.buffer.len();
        if pos > len {
            return Err(DnsError::truncated(pos, "seek target", pos - len, 0));
        }
        self.position = pos;
        Ok(())
    }

    #[inline]
    fn need(&self, need: usize, what: &'static str) -> Result<(), DnsError> {
        let rem = self.remaining();
        if need > rem {
            return Err(DnsError::truncated(self.position, what, need, rem));
        }
        Ok(())
    }

    /// Read a single byte from the DNS message.
    pub fn read_u8(&mut self) -> Result<u8, DnsError> {
        self.need(std::mem::size_of::<u8>(), "u8")?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Read a u16 from the DNS message.
    pub fn read_u16(&mut self) -> Result<u16, DnsError> {
        self.need(std::mem::size_of::<u16>(), "u16")?;

        let bytes = &self.buffer[self.position..self.position + 2];
        let word = u16::from_be_bytes([bytes[0], bytes[1]]);

        self.position += 2;

        Ok(word)
    }

    /// Read a u32 from the DNS message.
    pub fn read_u32(&mut self) -> Result<u32, DnsError> {
        self.need(std::mem::size_of::<u32>(), "u32")?;

        let data = &self.buffer[self.position..self.position + 4];
        let qword = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

        self.position += 4;
        Ok(qword)
    }

    /// Read a specified number of bytes from the DNS message.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8], DnsError> {
        self.need(length, "raw bytes")?;
        let data = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(data)
    }

    #[inline]
    /// Current reading position in the buffer.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the number of unread bytes remaining in the reader's buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use dotfwd_dns::reader::DnsMessageReader;
    /// let buf = [0u8, 1, 2];
    /// let mut r = DnsMessageReader::new(&buf);
    /// assert_eq!(r.remaining(), 3);
    /// r.seek(1).unwrap();
    /// assert_eq!(r.remaining(), 2);
    /// ```
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

/// Trait for types that can be directly parsed from a DNS message.
pub trait DnsReadable: Sized {
    fn read_from(reader: &mut DnsMessageReader) -> Result<Self, DnsError>;
}
