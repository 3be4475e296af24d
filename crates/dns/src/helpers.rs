use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    builder::DnsMessageBuilder,
    error::DnsError,
    message::{DnsHeader, DnsMessage, DnsQuestion, DnsResponseCode, HEADER_LEN, RecordType},
    name::DnsName,
    reader::{DnsMessageReader, DnsReadable},
};

/// Extracts the transaction ID from a DNS message.
pub fn extract_transaction_id(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Copy `message` with its transaction id replaced by `id`.
pub fn with_transaction_id(message: &[u8], id: u16) -> Bytes {
    let mut bytes = BytesMut::from(message);
    if bytes.len() >= 2 {
        bytes[..2].copy_from_slice(&id.to_be_bytes());
    }
    bytes.freeze()
}

/// Build a SERVFAIL answer for `query`.
///
/// The id, opcode, RD bit and question section are copied from the query.
/// If the query cannot be decoded the answer is a bare header carrying only
/// the query's id.
pub fn servfail_response(query: &[u8]) -> Bytes {
    match DnsMessage::decode(query) {
        Ok(message) => {
            let header = DnsHeader {
                opcode: message.header.opcode,
                recursion_desired: message.header.recursion_desired,
                recursion_available: true,
                ..DnsHeader::default()
            };
            let reply = DnsMessageBuilder::new()
                .with_id(message.id)
                .with_header(header)
                .with_questions(message.questions().to_vec())
                .with_response(DnsResponseCode::ServerFailure)
                .build();

            match reply.encode() {
                Ok(bytes) => return bytes,
                Err(e) => tracing::debug!(error = %e, "failed to encode error response"),
            }
        }
        Err(e) => tracing::debug!(error = %e, "query not decodable, sending bare error header"),
    }

    let header = DnsHeader {
        response: true,
        recursion_desired: false,
        rcode: DnsResponseCode::ServerFailure.into(),
        ..DnsHeader::default()
    };

    let mut bytes = BytesMut::with_capacity(HEADER_LEN);
    bytes.put_u16(extract_transaction_id(query).unwrap_or_default());
    bytes.put_u16(header.into());
    bytes.put_bytes(0, HEADER_LEN - 4);
    bytes.freeze()
}

/// Type and dotted name of the first question in `message`, with any
/// compression pointers resolved against the message itself.
pub fn question_key(message: &[u8]) -> Result<Option<(RecordType, String)>, DnsError> {
    let decoded = DnsMessage::decode(message)?;
    match decoded.questions().first() {
        Some(question) => Ok(Some((question.qtype, question.qname.to_dotted(message)?))),
        None => Ok(None),
    }
}

/// Smallest TTL in the answer section, `None` when there are no answers.
pub fn min_answer_ttl(message: &DnsMessage) -> Option<u32> {
    message.answers().iter().map(|r| r.ttl).min()
}

/// Copy `message` with every record TTL lowered by `elapsed` seconds, floored
/// at zero.
///
/// TTLs are patched in place so compression pointers stay valid. OPT
/// pseudo-records are left alone since their TTL field carries EDNS flags.
pub fn with_ttls_aged(message: &[u8], elapsed: u32) -> Result<Bytes, DnsError> {
    let mut aged = BytesMut::from(message);
    let mut reader = DnsMessageReader::new(message);

    reader.seek(4)?;
    let questions = reader.read_u16()?;
    let mut records = 0usize;
    for _ in 0..3 {
        records += usize::from(reader.read_u16()?);
    }

    for _ in 0..questions {
        DnsQuestion::read_from(&mut reader)?;
    }

    for _ in 0..records {
        DnsName::read_from(&mut reader)?;
        let record_type = RecordType::from(reader.read_u16()?);
        reader.read_u16()?; // class
        let ttl_at = reader.position();
        let ttl = reader.read_u32()?;
        let data_length = usize::from(reader.read_u16()?);
        reader.read_bytes(data_length)?;

        if record_type != RecordType::OPT && elapsed > 0 {
            aged[ttl_at..ttl_at + 4].copy_from_slice(&ttl.saturating_sub(elapsed).to_be_bytes());
        }
    }

    Ok(aged.freeze())
}
