//! HTTP/1.x client.
//!
//! Requests are built with [`get`], [`post`] and friends, configured with chained setters and
//! executed with [`HttpRequest::run`]. Each run opens a fresh connection; redirects are followed
//! as long as the URL scheme does not change.

mod body;
mod error;
mod payload;
mod request;
mod response;
mod stats;
pub(crate) mod transfer;

pub use body::Body;
pub use error::HttpError;
pub use payload::Payload;
pub use request::{
    delete, get, head, post, put, request, HttpRequest, Options, DEFAULT_MAXIMUM_HEADER_SIZE,
};
pub use response::Response;
pub use stats::Stats;
pub use transfer::{parse_status_line, parse_version};

pub use http::{header, HeaderMap, Method, StatusCode};

pub(crate) use transfer::RawResponse;

use crate::net::BoxedTransport;

/// The connection a request runs over.
pub type HttpConn = BoxedTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Http09,
    Http10,
    Http11,
    Http20,
    Http30,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http09 => "HTTP/0.9",
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
            Self::Http20 => "HTTP/2.0",
            Self::Http30 => "HTTP/3.0",
        }
    }

    pub fn from_digits(major: u32, minor: u32) -> Option<Self> {
        match (major, minor) {
            (0, 9) => Some(Self::Http09),
            (1, 0) => Some(Self::Http10),
            (1, 1) => Some(Self::Http11),
            (2, 0) => Some(Self::Http20),
            (3, 0) => Some(Self::Http30),
            _ => None,
        }
    }
}
