pub mod builder;
pub mod error;
pub mod helpers;
pub mod macros;
pub mod message;
pub mod name;
pub mod reader;
pub mod writer;

pub use builder::DnsMessageBuilder;
pub use error::DnsError;
pub use message::{ClassType, DnsHeader, DnsMessage, DnsQuestion, DnsRecord, DnsResponseCode, RecordType};
pub use name::{DnsName, NameSection, ResolvedLabels};

pub use reader::DnsMessageReader;
pub use writer::DnsMessageWriter;
