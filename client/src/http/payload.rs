use derive_more::From;
use futures::io::AsyncRead;
use std::fmt;

/// A request body.
#[derive(From)]
pub enum Payload {
    /// A body of known length, sent with a `Content-Length` header.
    Bytes(Vec<u8>),

    /// A body read from a stream, sent chunked unless the request sets `Content-Length`.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Payload {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}
