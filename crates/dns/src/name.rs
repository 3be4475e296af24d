use std::{collections::HashSet, fmt};

use bytes::Bytes;

use crate::{
    error::DnsError,
    reader::{DnsMessageReader, DnsReadable},
    writer::{DnsMessageWriter, DnsWritable},
};

/// Longest label allowed by RFC 1035.
pub const MAX_LABEL_LEN: usize = 63;
/// Longest name (in wire bytes) allowed by RFC 1035.
pub const MAX_NAME_LEN: usize = 255;
/// Largest offset a compression pointer can address.
pub const MAX_POINTER_OFFSET: u16 = 0x3FFF;

/// Top two bits of a length byte marking a compression pointer.
const POINTER_TAG: u8 = 0xC0;
const POINTER_FLAG: u16 = 0xC000;

/// One section of a domain name as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameSection {
    /// A raw label (1 to 63 bytes).
    Label(Bytes),
    /// A compression pointer: byte offset into the enclosing message.
    Pointer(u16),
}

/// A domain name exactly as it was read from (or will be written to) the wire.
///
/// Compression pointers are kept as-is and only followed on demand through
/// [`DnsName::resolve`], which needs the full message buffer. A pointer is
/// always the last section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DnsName {
    sections: Vec<NameSection>,
}

impl DnsName {
    /// The root name (a single zero byte on the wire).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a name from explicit sections.
    ///
    /// Labels must be 1 to 63 bytes long, a pointer may only appear as the
    /// last section and must fit in 14 bits.
    pub fn new(sections: Vec<NameSection>) -> Result<Self, DnsError> {
        let last = sections.len().saturating_sub(1);
        for (i, section) in sections.iter().enumerate() {
            match section {
                NameSection::Label(label) if label.is_empty() || label.len() > MAX_LABEL_LEN => {
                    return Err(DnsError::InvalidName(format!(
                        "label length {} outside 1..={}",
                        label.len(),
                        MAX_LABEL_LEN
                    )));
                }
                NameSection::Pointer(offset) if *offset > MAX_POINTER_OFFSET => {
                    return Err(DnsError::MalformedPointer {
                        offset: usize::from(*offset),
                    });
                }
                NameSection::Pointer(_) if i != last => {
                    return Err(DnsError::InvalidName("pointer must be the last section".into()));
                }
                _ => {}
            }
        }
        Ok(Self { sections })
    }

    /// A name consisting of nothing but a compression pointer.
    pub fn pointer(offset: u16) -> Result<Self, DnsError> {
        Self::new(vec![NameSection::Pointer(offset)])
    }

    /// Parse a dotted presentation name such as `www.example.com`.
    ///
    /// A trailing dot is accepted, `.` and the empty string are the root.
    pub fn from_dotted(s: impl AsRef<str>) -> Result<Self, DnsError> {
        let input = s.as_ref().trim();
        let input = input.strip_suffix('.').unwrap_or(input);

        if input.is_empty() {
            return Ok(Self::root());
        }

        let mut sections = Vec::new();
        let mut total = 1; // for the final zero
        for label in input.split('.') {
            if label.is_empty() {
                return Err(DnsError::InvalidName(format!("empty label in '{}'", input)));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidName(format!("label '{}' exceeds 63 bytes", label)));
            }
            total += 1 + label.len();
            sections.push(NameSection::Label(Bytes::copy_from_slice(label.as_bytes())));
        }

        if total > MAX_NAME_LEN {
            return Err(DnsError::InvalidName(format!("name too long ({} bytes): '{}'", total, input)));
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[NameSection] {
        &self.sections
    }

    /// Offset of the trailing compression pointer, if the name has one.
    pub fn pointer_target(&self) -> Option<u16> {
        match self.sections.last() {
            Some(NameSection::Pointer(offset)) => Some(*offset),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.pointer_target().is_some()
    }

    /// Follow the name through `message`, yielding every label in order.
    ///
    /// `message` must be the complete buffer the name was decoded from, since
    /// pointer offsets are relative to its first byte.
    pub fn resolve<'a>(&'a self, message: &'a [u8]) -> ResolvedLabels<'a> {
        ResolvedLabels {
            message,
            sections: self.sections.iter(),
            cursor: None,
            visited: HashSet::new(),
            done: false,
        }
    }

    /// Resolve the name into its lowercase dotted form (`.` for the root).
    pub fn to_dotted(&self, message: &[u8]) -> Result<String, DnsError> {
        let mut out = String::new();
        for label in self.resolve(message) {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&String::from_utf8_lossy(label?));
        }

        if out.is_empty() {
            return Ok(".".into());
        }

        out.make_ascii_lowercase();
        Ok(out)
    }
}

impl fmt::Display for DnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sections.is_empty() {
            return f.write_str(".");
        }
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match section {
                NameSection::Label(label) => f.write_str(&String::from_utf8_lossy(label))?,
                NameSection::Pointer(offset) => write!(f, "@{}", offset)?,
            }
        }
        Ok(())
    }
}

impl DnsReadable for DnsName {
    fn read_from(reader: &mut DnsMessageReader) -> Result<Self, DnsError> {
        let mut sections = Vec::new();

        loop {
            let length = reader.read_u8()?;

            match length & POINTER_TAG {
                POINTER_TAG => {
                    let low = reader.read_u8()?;
                    let offset = u16::from_be_bytes([length & !POINTER_TAG, low]);
                    sections.push(NameSection::Pointer(offset));
                    // pointer is always terminal
                    break;
                }
                0 if length == 0 => break,
                0 => {
                    let label = reader.read_bytes(usize::from(length))?;
                    sections.push(NameSection::Label(Bytes::copy_from_slice(label)));
                }
                _ => return Err(DnsError::InvalidLabel(length)),
            }
        }

        Ok(Self { sections })
    }
}

impl DnsWritable for DnsName {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> Result<(), DnsError> {
        for section in &self.sections {
            match section {
                NameSection::Label(label) => {
                    writer.write_u8(label.len() as u8)?;
                    writer.write_bytes(label)?;
                }
                // no terminator after a pointer
                NameSection::Pointer(offset) => return writer.write_u16(POINTER_FLAG | offset),
            }
        }
        writer.write_u8(0)
    }
}

/// Lazy label iterator returned by [`DnsName::resolve`].
///
/// Every pointer target is remembered; jumping to an offset twice is a loop
/// and ends the iteration with [`DnsError::MalformedPointer`].
pub struct ResolvedLabels<'a> {
    message: &'a [u8],
    sections: std::slice::Iter<'a, NameSection>,
    /// Position inside `message` once a pointer has been followed.
    cursor: Option<usize>,
    visited: HashSet<usize>,
    done: bool,
}

impl<'a> ResolvedLabels<'a> {
    fn jump(&mut self, offset: usize) -> Result<usize, DnsError> {
        if offset >= self.message.len() || !self.visited.insert(offset) {
            return Err(DnsError::MalformedPointer { offset });
        }
        Ok(offset)
    }

    /// Read the next label from the message starting at `pos`, following pointers.
    fn next_in_message(&mut self, mut pos: usize) -> Result<Option<&'a [u8]>, DnsError> {
        let message = self.message;

        loop {
            let length = *message
                .get(pos)
                .ok_or_else(|| DnsError::truncated(pos, "label length", 1, 0))?;

            match length & POINTER_TAG {
                POINTER_TAG => {
                    let low = *message
                        .get(pos + 1)
                        .ok_or_else(|| DnsError::truncated(pos, "compression pointer", 2, 1))?;
                    let offset = (usize::from(length & !POINTER_TAG) << 8) | usize::from(low);
                    pos = self.jump(offset)?;
                }
                0 if length == 0 => return Ok(None),
                0 => {
                    let start = pos + 1;
                    let end = start + usize::from(length);
                    let label = message.get(start..end).ok_or_else(|| {
                        DnsError::truncated(
                            start,
                            "label",
                            usize::from(length),
                            message.len().saturating_sub(start),
                        )
                    })?;
                    self.cursor = Some(end);
                    return Ok(Some(label));
                }
                _ => return Err(DnsError::InvalidLabel(length)),
            }
        }
    }
}

impl<'a> Iterator for ResolvedLabels<'a> {
    type Item = Result<&'a [u8], DnsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = match self.cursor {
            Some(pos) => self.next_in_message(pos),
            None => match self.sections.next() {
                Some(NameSection::Label(label)) => Ok(Some(&label[..])),
                Some(NameSection::Pointer(offset)) => self
                    .jump(usize::from(*offset))
                    .and_then(|pos| self.next_in_message(pos)),
                None => Ok(None),
            },
        };

        match step {
            Ok(Some(label)) => Some(Ok(label)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &DnsName) -> Bytes {
        let mut writer = DnsMessageWriter::new();
        name.write_to(&mut writer).unwrap();
        writer.into_bytes()
    }

    fn decode(data: &[u8]) -> Result<DnsName, DnsError> {
        DnsName::read_from(&mut DnsMessageReader::new(data))
    }

    #[test]
    fn test_from_dotted() {
        let name = DnsName::from_dotted("mail.example.com.").unwrap();
        assert_eq!(name.sections().len(), 3);
        assert_eq!(name.to_string(), "mail.example.com");
        assert_eq!(DnsName::from_dotted(".").unwrap(), DnsName::root());

        assert!(DnsName::from_dotted("a..b").is_err());
        assert!(DnsName::from_dotted(format!("{}.com", "a".repeat(64))).is_err());

        let long = vec!["abcdefghi"; 26].join(".");
        assert!(DnsName::from_dotted(long).is_err());
    }

    #[test]
    fn test_new_rejects_inner_pointer() {
        let sections = vec![
            NameSection::Pointer(12),
            NameSection::Label(Bytes::from_static(b"www")),
        ];
        assert!(DnsName::new(sections).is_err());
        assert!(DnsName::pointer(0x4000).is_err());
        assert!(DnsName::new(vec![NameSection::Label(Bytes::new())]).is_err());
    }

    #[test]
    fn test_encode_plain_name() {
        let name = DnsName::from_dotted("example.com").unwrap();
        assert!(!name.is_compressed());
        assert_eq!(
            &encode(&name)[..],
            &[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]
        );
        assert_eq!(&encode(&DnsName::root())[..], &[0]);
    }

    #[test]
    fn test_pointer_round_trip() {
        let name = DnsName::pointer(12).unwrap();
        let bytes = encode(&name);

        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0] >> 4, 0b1100);
        assert_eq!(&bytes[..], &[0xC0, 0x0C]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, name);
        assert!(decoded.is_compressed());
        assert_eq!(decoded.pointer_target(), Some(12));
    }

    #[test]
    fn test_decode_label_then_pointer_stops_at_pointer() {
        // "www" + pointer, followed by bytes that must not be consumed
        let data = [3, b'w', b'w', b'w', 0xC0, 0x0C, 0xFF, 0xFF];
        let mut reader = DnsMessageReader::new(&data);

        let name = DnsName::read_from(&mut reader).unwrap();
        assert_eq!(reader.position(), 6);
        assert!(name.is_compressed());
        assert_eq!(
            name.sections(),
            &[
                NameSection::Label(Bytes::from_static(b"www")),
                NameSection::Pointer(12)
            ]
        );
        assert_eq!(&encode(&name)[..], &data[..6]);
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            decode(&[10, b'a', b'b', b'c']),
            Err(DnsError::TruncatedMessage { .. })
        ));
        assert!(matches!(decode(&[3, b'c', b'o', b'm']), Err(DnsError::TruncatedMessage { .. })));
        assert!(matches!(decode(&[0xC0]), Err(DnsError::TruncatedMessage { .. })));
        assert!(matches!(decode(&[]), Err(DnsError::TruncatedMessage { .. })));
    }

    #[test]
    fn test_decode_rejects_extended_label_types() {
        assert_eq!(decode(&[0x41, 0x00]), Err(DnsError::InvalidLabel(0x41)));
        assert_eq!(decode(&[0x80, 0x00]), Err(DnsError::InvalidLabel(0x80)));
    }

    #[test]
    fn test_resolve_follows_pointers() {
        // "example.com" at offset 0, "www" + pointer(0) at offset 13,
        // "mail" + pointer(13) at offset 19
        let mut message = vec![7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0];
        message.extend_from_slice(&[3, b'w', b'w', b'w', 0xC0, 0x00]);
        message.extend_from_slice(&[4, b'm', b'a', b'i', b'l', 0xC0, 13]);

        let mut reader = DnsMessageReader::new(&message);
        reader.seek(19).unwrap();
        let name = DnsName::read_from(&mut reader).unwrap();

        let labels: Vec<&[u8]> = name.resolve(&message).collect::<Result<_, _>>().unwrap();
        assert_eq!(labels, vec![&b"mail"[..], b"www", b"example", b"com"]);
        assert_eq!(name.to_dotted(&message).unwrap(), "mail.www.example.com");
    }

    #[test]
    fn test_resolve_lowercases() {
        let message = [3, b'W', b'w', b'W', 2, b'I', b'o', 0];
        let name = DnsName::pointer(0).unwrap();
        assert_eq!(name.to_dotted(&message).unwrap(), "www.io");
    }

    #[test]
    fn test_resolve_detects_pointer_loop() {
        // offset 0 points to 2, offset 2 points back to 0
        let message = [0xC0, 0x02, 0xC0, 0x00];
        let name = DnsName::pointer(0).unwrap();

        let result: Result<Vec<_>, _> = name.resolve(&message).collect();
        assert_eq!(result, Err(DnsError::MalformedPointer { offset: 0 }));
    }

    #[test]
    fn test_resolve_detects_self_pointer_after_labels() {
        // "a" then a pointer back to the start of the same name
        let message = [1, b'a', 0xC0, 0x00];
        let name = DnsName::pointer(0).unwrap();

        let mut labels = name.resolve(&message);
        assert_eq!(labels.next(), Some(Ok(&b"a"[..])));
        assert_eq!(labels.next(), Some(Err(DnsError::MalformedPointer { offset: 0 })));
        assert_eq!(labels.next(), None);
    }

    #[test]
    fn test_resolve_out_of_bounds_pointer() {
        let name = DnsName::pointer(100).unwrap();
        assert_eq!(
            name.to_dotted(&[0, 0, 0]),
            Err(DnsError::MalformedPointer { offset: 100 })
        );
    }

    #[test]
    fn test_resolve_truncated_label() {
        let message = [5, b'a', b'b'];
        let name = DnsName::pointer(0).unwrap();
        assert!(matches!(
            name.to_dotted(&message),
            Err(DnsError::TruncatedMessage { .. })
        ));
    }

    #[test]
    fn test_resolve_uncompressed_needs_no_buffer() {
        let name = DnsName::from_dotted("example.org").unwrap();
        assert_eq!(name.to_dotted(&[]).unwrap(), "example.org");
        assert_eq!(DnsName::root().to_dotted(&[]).unwrap(), ".");
    }
}
