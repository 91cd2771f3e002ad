//! Error Types

use thiserror::Error;

/// Failure category, one per fatal condition of a decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    StreamNotFound,
    CodecUnavailable,
    ContextAllocation,
    FormatNegotiation,
    FilterGraph,
    Decode,
    Config,
}

/// Main error type
#[derive(Debug, Clone, Error)]
pub enum DecodeAudioError {
    #[error("{message}")]
    Io { message: String },
    #[error("{message}")]
    StreamNotFound { message: String },
    #[error("{message}")]
    CodecUnavailable { message: String },
    #[error("{message}")]
    ContextAllocation { message: String },
    #[error("{message}")]
    FormatNegotiation { message: String },
    #[error("Filter graph error: {message}")]
    FilterGraph { message: String },
    #[error("Decode error: {message}")]
    Decode { message: String },
    #[error("Config error: {message}")]
    Config { message: String },
}

impl DecodeAudioError {
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io { message: msg.into() }
    }
    pub fn stream_not_found<S: Into<String>>(msg: S) -> Self {
        Self::StreamNotFound { message: msg.into() }
    }
    pub fn codec_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::CodecUnavailable { message: msg.into() }
    }
    pub fn context_allocation<S: Into<String>>(msg: S) -> Self {
        Self::ContextAllocation { message: msg.into() }
    }
    pub fn format_negotiation<S: Into<String>>(msg: S) -> Self {
        Self::FormatNegotiation { message: msg.into() }
    }
    pub fn filter_graph<S: Into<String>>(msg: S) -> Self {
        Self::FilterGraph { message: msg.into() }
    }
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode { message: msg.into() }
    }
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::StreamNotFound { .. } => ErrorKind::StreamNotFound,
            Self::CodecUnavailable { .. } => ErrorKind::CodecUnavailable,
            Self::ContextAllocation { .. } => ErrorKind::ContextAllocation,
            Self::FormatNegotiation { .. } => ErrorKind::FormatNegotiation,
            Self::FilterGraph { .. } => ErrorKind::FilterGraph,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Render the message into at most `capacity - 1` bytes, the way a
    /// fixed C string slot would hold it.
    pub fn bounded_message(&self, capacity: usize) -> String {
        bounded(&self.to_string(), capacity)
    }
}

pub(crate) fn bounded(message: &str, capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    if message.len() <= limit {
        return message.to_string();
    }
    let mut end = limit;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

pub type Result<T> = std::result::Result<T, DecodeAudioError>;

impl From<std::io::Error> for DecodeAudioError {
    fn from(err: std::io::Error) -> Self { Self::io(err.to_string()) }
}

impl From<rubato::ResampleError> for DecodeAudioError {
    fn from(err: rubato::ResampleError) -> Self {
        Self::filter_graph(format!("aresample: {}", err))
    }
}

impl From<rubato::ResamplerConstructionError> for DecodeAudioError {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        Self::filter_graph(format!("aresample: {}", err))
    }
}
