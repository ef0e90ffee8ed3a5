//! Errors returned by URL transfers.

use crate::{dns::DnsError, http::HttpError, ws::WebSocketError};
use snafu::Snafu;
use std::io;

/// Errors returned by this crate.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("I/O error: {source}"))]
    Io { source: io::Error },

    #[snafu(display("invalid URL: {source}"))]
    InvalidUrl { source: url::ParseError },

    #[snafu(display("URL scheme '{scheme}' is invalid for this request"))]
    InvalidScheme { scheme: String },

    /// The request was already run, or failed while it was being built and the failure was
    /// already reported.
    #[snafu(display("invalid request"))]
    InvalidRequest,

    #[snafu(display("invalid redirect URL '{location}'"))]
    InvalidRedirectUrl {
        #[snafu(implicit(false))]
        location: String,
    },

    #[snafu(display("redirect forbidden due to change in URL scheme to '{scheme}'"))]
    RedirectForbidden { scheme: String },

    #[snafu(display("partial file"))]
    PartialFile,

    #[snafu(display("no addresses to connect to"))]
    NoAddresses,

    #[snafu(display("{operation} timed out"))]
    TimedOut { operation: &'static str },

    #[snafu(display("stream has been shut down"))]
    Shutdown,

    #[snafu(display("invalid UTF-8 data"))]
    InvalidUtf8,

    #[snafu(display("invalid server name '{host}'"))]
    InvalidServerName { host: String },

    #[snafu(display("TLS error: {source}"))]
    Tls { source: rustls::Error },

    #[snafu(display("cannot decode JSON: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("DNS error: {source}"))]
    Dns { source: DnsError },

    #[snafu(display("HTTP error: {source}"))]
    Http { source: HttpError },

    #[snafu(display("WebSocket error: {source}"))]
    WebSocket { source: WebSocketError },
}

/// Result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Is this a timeout of some operation?
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::TimedOut { .. } => true,
            Self::Dns { source } => matches!(source, DnsError::TimedOut),
            Self::WebSocket { source } => matches!(source, WebSocketError::HandshakeTimeout),
            Self::Io { source } => source.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Is this an unexpected end of stream?
    pub fn is_eof(&self) -> bool {
        match self {
            Self::PartialFile => true,
            Self::Io { source } => source.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source } => source,
            err => {
                let kind = if err.is_timeout() {
                    io::ErrorKind::TimedOut
                } else if err.is_eof() {
                    io::ErrorKind::UnexpectedEof
                } else {
                    io::ErrorKind::Other
                };
                io::Error::new(kind, err)
            }
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<url::ParseError> for Error {
    fn from(source: url::ParseError) -> Self {
        Self::InvalidUrl { source }
    }
}

impl From<DnsError> for Error {
    fn from(source: DnsError) -> Self {
        Self::Dns { source }
    }
}

impl From<HttpError> for Error {
    fn from(source: HttpError) -> Self {
        Self::Http { source }
    }
}

impl From<WebSocketError> for Error {
    fn from(source: WebSocketError) -> Self {
        Self::WebSocket { source }
    }
}

impl From<rustls::Error> for Error {
    fn from(source: rustls::Error) -> Self {
        Self::Tls { source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8
    }
}
