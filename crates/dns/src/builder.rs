use super::message::{DnsHeader, DnsMessage, DnsQuestion, DnsRecord, DnsResponseCode};

/// Builder
#[derive(Debug, Clone, Default)]
pub struct DnsMessageBuilder {
    id: u16,
    header: DnsHeader,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
}

impl DnsMessageBuilder {
    /// Create a new DNS message builder for a recursive query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ID for the DNS packet.
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the flags for the DNS packet.
    pub fn with_header(mut self, header: DnsHeader) -> Self {
        self.header = header;
        self
    }

    /// Turn the message into a response carrying the given code.
    pub fn with_response(mut self, code: DnsResponseCode) -> Self {
        self.header.response = true;
        self.header.set_response_code(code);
        self
    }

    pub fn with_questions(mut self, questions: Vec<DnsQuestion>) -> Self {
        self.questions = questions;
        self
    }

    /// Add a question to the DNS packet.
    pub fn add_question(mut self, question: DnsQuestion) -> Self {
        self.questions.push(question);
        self
    }

    pub fn add_answer(mut self, record: DnsRecord) -> Self {
        self.answers.push(record);
        self
    }

    pub fn add_authority_record(mut self, record: DnsRecord) -> Self {
        self.authority_records.push(record);
        self
    }

    pub fn add_additional_record(mut self, record: DnsRecord) -> Self {
        self.additional_records.push(record);
        self
    }

    pub fn build(self) -> DnsMessage {
        DnsMessage::new(
            self.id,
            self.header,
            self.questions,
            self.answers,
            self.authority_records,
            self.additional_records,
        )
    }
}
