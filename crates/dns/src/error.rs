use thiserror::Error;

/// Errors produced while decoding, encoding or resolving DNS wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    /// The input ran out before a complete field could be read.
    #[error("truncated message at pos {position} while reading {what}: need {needed} bytes, have {remaining}")]
    TruncatedMessage {
        position: usize,
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A compression pointer targets an offset outside the message, or
    /// revisits an offset already followed during the same resolution.
    #[error("malformed compression pointer to offset {offset}")]
    MalformedPointer { offset: usize },

    /// Label length byte with the reserved `01`/`10` prefix.
    #[error("unsupported label type 0x{0:02x}")]
    InvalidLabel(u8),

    #[error("invalid domain name: {0}")]
    InvalidName(String),

    /// A value does not fit into its length or count field.
    #[error("{0} exceeds its wire length limit")]
    Overflow(&'static str),
}

impl DnsError {
    pub(crate) fn truncated(position: usize, what: &'static str, needed: usize, remaining: usize) -> Self {
        Self::TruncatedMessage {
            position,
            what,
            needed,
            remaining,
        }
    }
}
