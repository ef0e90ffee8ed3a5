use super::Version;
use http::header::{HeaderName, InvalidHeaderName, InvalidHeaderValue};
use snafu::Snafu;

/// Protocol errors from an HTTP peer, or from headers supplied by the caller.
#[derive(Debug, Snafu)]
pub enum HttpError {
    #[snafu(display("headers too long"))]
    HeadersTooLong,

    #[snafu(display("invalid HTTP status line '{line}'"))]
    InvalidStatusLine { line: String },

    #[snafu(display("unexpected HTTP version {}", version.as_str()))]
    UnexpectedVersion { version: Version },

    #[snafu(display("invalid value '{value}' for header {name}"))]
    InvalidHeader { name: HeaderName, value: String },

    #[snafu(display("invalid header name: {source}"))]
    InvalidHeaderName { source: InvalidHeaderName },

    #[snafu(display("invalid header value: {source}"))]
    InvalidHeaderValue { source: InvalidHeaderValue },

    #[snafu(display("invalid chunk size"))]
    InvalidChunkSize,

    #[snafu(display("chunk too large"))]
    ChunkTooLarge,

    /// Chunk data was not followed by CRLF.
    #[snafu(display("invalid end of chunk"))]
    InvalidChunkEnd,

    /// Trailers were requested while body data was still unread.
    #[snafu(display("body not fully read"))]
    BodyRemaining,
}

impl From<InvalidHeaderName> for HttpError {
    fn from(source: InvalidHeaderName) -> Self {
        Self::InvalidHeaderName { source }
    }
}

impl From<InvalidHeaderValue> for HttpError {
    fn from(source: InvalidHeaderValue) -> Self {
        Self::InvalidHeaderValue { source }
    }
}

impl From<InvalidHeaderName> for crate::Error {
    fn from(source: InvalidHeaderName) -> Self {
        HttpError::from(source).into()
    }
}

impl From<InvalidHeaderValue> for crate::Error {
    fn from(source: InvalidHeaderValue) -> Self {
        HttpError::from(source).into()
    }
}
