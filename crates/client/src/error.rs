use thiserror::Error;

/// Errors raised while splitting or building upstream frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame declares length {0}, which cannot hold a transaction id")]
    TooShort(usize),
    #[error("message of {0} bytes does not fit in a frame")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client state: {0}")]
    InvalidState(&'static str),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("tls configuration error: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
