use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    error::DnsError,
    name::DnsName,
    reader::{DnsMessageReader, DnsReadable},
    writer::{DnsMessageWriter, DnsWritable},
};

/// Length of the fixed RFC 1035 header (id, flags and the four counts).
pub const HEADER_LEN: usize = 12;

/// Represents a DNS message.
///
/// Section counts are not stored: they are derived from the section vectors
/// when the message is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    /// Transaction id
    pub id: u16,
    /// Flags
    pub header: DnsHeader,
    /// Questions in the DNS message
    questions: Vec<DnsQuestion>,
    /// Answers in the DNS message
    answers: Vec<DnsRecord>,
    /// Authority records in the DNS message
    authority_records: Vec<DnsRecord>,
    /// Additional records in the DNS message
    additional_records: Vec<DnsRecord>,
}

impl DnsMessage {
    pub fn new(
        id: u16,
        header: DnsHeader,
        questions: Vec<DnsQuestion>,
        answers: Vec<DnsRecord>,
        authority_records: Vec<DnsRecord>,
        additional_records: Vec<DnsRecord>,
    ) -> Self {
        Self {
            id,
            header,
            questions,
            answers,
            authority_records,
            additional_records,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, DnsError> {
        let mut reader = DnsMessageReader::new(data);

        let id = reader.read_u16()?;
        let header = DnsHeader::read_from(&mut reader)?;

        let number_of_questions = reader.read_u16()?; // QDCOUNT
        let number_of_answers = reader.read_u16()?; // ANCOUNT
        let number_of_authority_records = reader.read_u16()?; // NSCOUNT
        let number_of_additional_records = reader.read_u16()?; // ARCOUNT

        let questions = read_section(&mut reader, number_of_questions)?;
        let answers = read_section(&mut reader, number_of_answers)?;
        let authority_records = read_section(&mut reader, number_of_authority_records)?;
        let additional_records = read_section(&mut reader, number_of_additional_records)?;

        Ok(Self {
            id,
            header,
            questions,
            answers,
            authority_records,
            additional_records,
        })
    }

    pub fn encode(&self) -> Result<Bytes, DnsError> {
        let mut writer = DnsMessageWriter::new();

        // ID
        writer.write_u16(self.id)?;

        // Flags
        self.header.write_to(&mut writer)?;

        // QDCOUNT, ANCOUNT, NSCOUNT, ARCOUNT
        writer.write_u16(section_count(self.questions.len())?)?;
        writer.write_u16(section_count(self.answers.len())?)?;
        writer.write_u16(section_count(self.authority_records.len())?)?;
        writer.write_u16(section_count(self.additional_records.len())?)?;

        for question in &self.questions {
            question.write_to(&mut writer)?;
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority_records)
            .chain(&self.additional_records)
        {
            record.write_to(&mut writer)?;
        }

        Ok(writer.into_bytes())
    }

    /// Questions
    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    /// Answers
    pub fn answers(&self) -> &[DnsRecord] {
        &self.answers
    }

    /// Authority records
    pub fn authority_records(&self) -> &[DnsRecord] {
        &self.authority_records
    }

    /// Additional records
    pub fn additional_records(&self) -> &[DnsRecord] {
        &self.additional_records
    }

    pub fn answers_mut(&mut self) -> &mut Vec<DnsRecord> {
        &mut self.answers
    }
}

fn read_section<T: DnsReadable>(reader: &mut DnsMessageReader, count: u16) -> Result<Vec<T>, DnsError> {
    // don't trust the count for preallocation, a bogus header could claim 65535 entries.
    let mut items = Vec::with_capacity(usize::from(count).min(reader.remaining() / 4));
    for _ in 0..count {
        items.push(T::read_from(reader)?);
    }
    Ok(items)
}

fn section_count(len: usize) -> Result<u16, DnsError> {
    u16::try_from(len).map_err(|_| DnsError::Overflow("section count"))
}

/// The 16 flag bits following the transaction id.
///
/// Every bit is kept, including the reserved `z` field, so that a decoded
/// header re-encodes to the same two bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DnsHeader {
    /// Query (false) or Response (true)
    pub response: bool,
    /// 4-bit opcode
    pub opcode: u8,
    /// Authoritative Answer
    pub authoritative: bool,
    /// Truncated
    pub truncated: bool,
    /// Recursion Desired
    pub recursion_desired: bool,
    /// Recursion Available
    pub recursion_available: bool,
    /// 3-bit reserved field (carries AD/CD on modern resolvers)
    pub z: u8,
    /// 4-bit response code
    pub rcode: u8,
}

impl Default for DnsHeader {
    fn default() -> Self {
        Self {
            response: false,
            opcode: 0,
            authoritative: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            z: 0,
            rcode: 0,
        }
    }
}

impl From<u16> for DnsHeader {
    fn from(bits: u16) -> Self {
        Self {
            response: (bits >> 15) & 0x1 != 0,
            opcode: ((bits >> 11) & 0xF) as u8,
            authoritative: (bits >> 10) & 0x1 != 0,
            truncated: (bits >> 9) & 0x1 != 0,
            recursion_desired: (bits >> 8) & 0x1 != 0,
            recursion_available: (bits >> 7) & 0x1 != 0,
            z: ((bits >> 4) & 0x7) as u8,
            rcode: (bits & 0xF) as u8,
        }
    }
}

impl From<DnsHeader> for u16 {
    fn from(header: DnsHeader) -> Self {
        ((header.response as u16) << 15)
            | ((u16::from(header.opcode) & 0xF) << 11)
            | ((header.authoritative as u16) << 10)
            | ((header.truncated as u16) << 9)
            | ((header.recursion_desired as u16) << 8)
            | ((header.recursion_available as u16) << 7)
            | ((u16::from(header.z) & 0x7) << 4)
            | (u16::from(header.rcode) & 0xF)
    }
}

impl DnsHeader {
    /// Response code, if it is one of the known values.
    pub fn response_code(&self) -> Option<DnsResponseCode> {
        DnsResponseCode::try_from(self.rcode).ok()
    }

    pub fn set_response_code(&mut self, code: DnsResponseCode) {
        self.rcode = code.into();
    }
}

impl DnsReadable for DnsHeader {
    fn read_from(reader: &mut DnsMessageReader) -> Result<Self, DnsError> {
        Ok(Self::from(reader.read_u16()?))
    }
}

impl DnsWritable for DnsHeader {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> Result<(), DnsError> {
        writer.write_u16((*self).into())
    }
}

/// Dns response code (the 4-bit header values only)
///
/// Based on: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsResponseCode {
    /// No error, the request was successful
    #[default]
    NoError = 0,
    /// Format error, the request was malformed
    FormatError = 1,
    /// Server failure, the server encountered an error while processing the request
    ServerFailure = 2,
    /// Non-existent domain, the requested domain does not exist
    NxDomain = 3,
    /// Not Implemented
    NotImp = 4,
    /// Query refused
    Refused = 5,
    /// Name Exists when it should not
    YXDomain = 6,
    /// RR Set Exists when it should not
    YXRRSet = 7,
    /// RR Set that should exist does not
    NXRRSet = 8,
    /// Server Not Authoritative for zone
    NotAuth = 9,
    /// Name not contained in zone
    NotZone = 10,
}

crate::wire_u16_enum! {
    /// Resource record type.
    pub enum RecordType: "TYPE" {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        OPT = 41,
        ANY = 255,
    }
}

crate::wire_u16_enum! {
    /// Resource record class.
    pub enum ClassType: "CLASS" {
        IN = 1,
        CH = 3,
        HS = 4,
        NONE = 254,
        ANY = 255,
    }
}

/// Represents a DNS question in a DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// The domain name being queried
    pub qname: DnsName,
    /// The type of the query (e.g., A, AAAA, CNAME)
    pub qtype: RecordType,
    /// The class of the query (e.g., IN for Internet)
    pub qclass: ClassType,
}

impl DnsQuestion {
    pub fn new(qname: DnsName, qtype: RecordType, qclass: ClassType) -> Self {
        Self { qname, qtype, qclass }
    }
}

impl DnsReadable for DnsQuestion {
    fn read_from(reader: &mut DnsMessageReader) -> Result<Self, DnsError> {
        let qname = DnsName::read_from(reader)?;
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = ClassType::from(reader.read_u16()?);
        Ok(Self { qname, qtype, qclass })
    }
}

impl DnsWritable for DnsQuestion {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> Result<(), DnsError> {
        self.qname.write_to(writer)?;
        writer.write_u16(self.qtype.into())?;
        writer.write_u16(self.qclass.into())
    }
}

/// A resource record. The data is carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: DnsName,
    pub record_type: RecordType,
    pub class: ClassType,
    pub ttl: u32,
    pub data: Bytes,
}

impl DnsRecord {
    pub fn new(name: DnsName, record_type: RecordType, class: ClassType, ttl: u32, data: Bytes) -> Self {
        Self {
            name,
            record_type,
            class,
            ttl,
            data,
        }
    }
}

impl DnsReadable for DnsRecord {
    fn read_from(reader: &mut DnsMessageReader) -> Result<Self, DnsError> {
        let name = DnsName::read_from(reader)?;
        let record_type = RecordType::from(reader.read_u16()?);
        let class = ClassType::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let data_length = usize::from(reader.read_u16()?);
        let data = Bytes::copy_from_slice(reader.read_bytes(data_length)?);

        Ok(Self {
            name,
            record_type,
            class,
            ttl,
            data,
        })
    }
}

impl DnsWritable for DnsRecord {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> Result<(), DnsError> {
        let rdlen = u16::try_from(self.data.len()).map_err(|_| DnsError::Overflow("record data"))?;

        self.name.write_to(writer)?;
        writer.write_u16(self.record_type.into())?;
        writer.write_u16(self.class.into())?;
        writer.write_u32(self.ttl)?;
        writer.write_u16(rdlen)?;
        writer.write_bytes(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::DnsMessageBuilder;

    use super::*;

    /// Response for `example.com A` whose answer name is a pointer to the question.
    const COMPRESSED_RESPONSE: [u8; 45] = [
        0xBE, 0xEF, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // header
        7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0, // qname
        0x00, 0x01, 0x00, 0x01, // qtype, qclass
        0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x0E, 0x10, // answer name, type, class, ttl
        0x00, 0x04, 93, 184, 216, 34, // rdata
    ];

    fn sample_message() -> DnsMessage {
        DnsMessageBuilder::new()
            .with_id(12345)
            .with_header(DnsHeader {
                response: true,
                opcode: 2,
                authoritative: true,
                truncated: false,
                recursion_desired: true,
                recursion_available: true,
                z: 0b101,
                rcode: 3,
            })
            .add_question(DnsQuestion::new(
                DnsName::from_dotted("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
            ))
            .add_answer(DnsRecord::new(
                DnsName::from_dotted("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
                300,
                Bytes::from_static(&[10, 0, 0, 1]),
            ))
            .add_authority_record(DnsRecord::new(
                DnsName::from_dotted("com").unwrap(),
                RecordType::NS,
                ClassType::IN,
                172800,
                Bytes::from_static(b"\x01a\x0cgtld-servers\x03net\x00"),
            ))
            .add_additional_record(DnsRecord::new(
                DnsName::root(),
                RecordType::OPT,
                ClassType::Unknown(1232),
                0,
                Bytes::new(),
            ))
            .build()
    }

    #[test]
    fn test_header_bits_round_trip() {
        for bits in [0x0000u16, 0x0100, 0x8180, 0x8583, 0xFFFF, 0x7A5C] {
            let header = DnsHeader::from(bits);
            assert_eq!(u16::from(header), bits);
        }

        let header = DnsHeader::from(0x8180);
        assert!(header.response);
        assert!(header.recursion_desired);
        assert!(header.recursion_available);
        assert_eq!(header.response_code(), Some(DnsResponseCode::NoError));
    }

    #[test]
    fn test_encode_decode() {
        let message = sample_message();

        let bytes = message.encode().unwrap();
        let decoded = DnsMessage::decode(&bytes).unwrap();

        assert_eq!(decoded, message);
        assert_eq!(decoded.id, 12345);
        assert_eq!(decoded.header.z, 0b101);
        assert_eq!(decoded.additional_records()[0].class, ClassType::Unknown(1232));
    }

    #[test]
    fn test_counts_follow_sections() {
        let mut message = sample_message();
        message.answers_mut().clear();

        let bytes = message.encode().unwrap();
        assert_eq!(&bytes[4..12], &[0, 1, 0, 0, 0, 1, 0, 1]);
        assert_eq!(DnsMessage::decode(&bytes).unwrap().answers().len(), 0);
    }

    #[test]
    fn test_compressed_message_is_bit_exact() {
        let message = DnsMessage::decode(&COMPRESSED_RESPONSE).unwrap();

        let answer = &message.answers()[0];
        assert_eq!(answer.name, DnsName::pointer(12).unwrap());
        assert_eq!(answer.ttl, 3600);
        assert_eq!(&answer.data[..], &[93, 184, 216, 34]);
        assert_eq!(answer.name.to_dotted(&COMPRESSED_RESPONSE).unwrap(), "example.com");

        assert_eq!(&message.encode().unwrap()[..], &COMPRESSED_RESPONSE[..]);
    }

    #[test]
    fn test_decode_truncated_message() {
        for len in [0, 5, 11, 20, 30, 44] {
            assert!(
                matches!(
                    DnsMessage::decode(&COMPRESSED_RESPONSE[..len]),
                    Err(DnsError::TruncatedMessage { .. })
                ),
                "prefix of {} bytes should be truncated",
                len
            );
        }
    }

    #[test]
    fn test_bogus_counts_fail_cleanly() {
        let mut data = COMPRESSED_RESPONSE.to_vec();
        data[6] = 0xFF;
        data[7] = 0xFF;
        assert!(DnsMessage::decode(&data).is_err());
    }

    #[test]
    fn test_oversized_rdata_is_rejected() {
        let message = DnsMessageBuilder::new()
            .add_answer(DnsRecord::new(
                DnsName::root(),
                RecordType::TXT,
                ClassType::IN,
                1,
                Bytes::from(vec![0u8; 70_000]),
            ))
            .build();

        assert_eq!(message.encode(), Err(DnsError::Overflow("record data")));
    }

    #[test]
    fn test_record_type_round_trip() {
        assert_eq!(RecordType::from(28), RecordType::AAAA);
        assert_eq!(u16::from(RecordType::MX), 15);
        assert_eq!(RecordType::from(99), RecordType::Unknown(99));
        assert_eq!(RecordType::Unknown(99).to_u16(), 99);
    }

    #[test]
    fn test_wire_enum_display() {
        assert_eq!(RecordType::AAAA.to_string(), "AAAA");
        assert_eq!(RecordType::from_u16(99).to_string(), "TYPE99");
        assert_eq!(ClassType::Unknown(1232).to_string(), "CLASS1232");
        assert_eq!(ClassType::IN.mnemonic(), Some("IN"));
        assert_eq!(RecordType::Unknown(7).mnemonic(), None);
    }
}
