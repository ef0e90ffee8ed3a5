use super::{transfer::read_header_line, HttpConn, HttpError, RawResponse};
use crate::{
    error::{Error, Result},
    net::BufStream,
};
use futures::{
    io::AsyncRead,
    stream::{self, Stream, TryStreamExt},
};
use http::{header, HeaderMap, Method};
use memchr::memchr;
use serde::de::DeserializeOwned;
use std::io;
use std::str::from_utf8;

/// Hex digits in the largest chunk size we accept.
const MAX_CHUNK_SIZE_DIGITS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkedState {
    Size,
    Extension(u64),
    Data(u64),
    /// The CRLF after chunk data.
    ChunkEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    /// No more data left to read.
    Empty,

    /// Read until the connection ends.
    Connection,

    /// `Content-Length` bytes remain.
    Length(u64),

    /// `Transfer-Encoding: chunked`
    Chunks(ChunkedState),

    /// Chunked trailers.
    Trailers,
}

/// The body of a response, read from the connection as it is consumed.
pub struct Body<S = HttpConn> {
    reader: BufStream<S>,
    transfer: Transfer,
    reusable: bool,
}

impl<S: AsyncRead + Unpin> Body<S> {
    pub(crate) fn new(reader: BufStream<S>, method: &Method, response: &RawResponse) -> Result<Self> {
        let mut body = Self {
            reader,
            transfer: Transfer::Connection,
            reusable: false,
        };

        let status = response.status.as_u16();
        let bodyless = *method == Method::HEAD || status == 204 || status == 304 || status < 200;
        let headers = &response.headers;

        if bodyless {
            body.transfer = Transfer::Empty;
        } else if let Some(encoding) = headers.get(header::TRANSFER_ENCODING) {
            let chunked = encoding
                .to_str()
                .unwrap_or_default()
                .split(',')
                .any(|encoding| encoding.trim().eq_ignore_ascii_case("chunked"));
            if chunked {
                body.transfer = Transfer::Chunks(ChunkedState::Size);
            }
        } else if let Some(length) = headers.get(header::CONTENT_LENGTH) {
            let invalid = || HttpError::InvalidHeader {
                name: header::CONTENT_LENGTH,
                value: String::from_utf8_lossy(length.as_bytes()).into_owned(),
            };
            let len = length
                .to_str()
                .map_err(|_| invalid())?
                .trim()
                .parse()
                .map_err(|_| invalid())?;
            body.transfer = Transfer::Length(len);
        }

        if let Some(conn) = headers.get(header::CONNECTION) {
            if conn.as_bytes().eq_ignore_ascii_case(b"keep-alive") {
                body.reusable = true;
            }
        }

        Ok(body)
    }

    /// The connection, positioned after whatever has been read of the body.
    pub(crate) fn into_inner(self) -> BufStream<S> {
        self.reader
    }

    /// Whether the server offered to keep the connection open after this body.
    pub fn reusable(&self) -> bool {
        self.reusable
    }

    /// The number of bytes left, if known.
    pub fn remaining(&self) -> Option<u64> {
        match self.transfer {
            Transfer::Empty => Some(0),
            Transfer::Length(remaining) => Some(remaining),
            _ => None,
        }
    }

    async fn read_chunk_size(&mut self) -> Result<u64> {
        let index = loop {
            let buf = self.reader.buffer();
            let len = buf.len().min(MAX_CHUNK_SIZE_DIGITS + 1);

            if let Some(index) = buf[..len].iter().position(|x| !x.is_ascii_hexdigit()) {
                break index;
            }
            if len > MAX_CHUNK_SIZE_DIGITS {
                return Err(HttpError::ChunkTooLarge.into());
            }
            if self.reader.fill().await? == 0 {
                return Err(Error::PartialFile);
            }
        };

        if index == 0 {
            return Err(HttpError::InvalidChunkSize.into());
        }

        let digits = from_utf8(&self.reader.buffer()[..index])?;
        let size = u64::from_str_radix(digits, 16).map_err(|_| HttpError::ChunkTooLarge)?;
        self.reader.consume(index);

        Ok(size)
    }

    async fn read_until_newline(&mut self) -> Result<()> {
        loop {
            match memchr(b'\n', self.reader.buffer()) {
                Some(index) => {
                    self.reader.consume(index + 1);
                    return Ok(());
                }
                None => self.reader.discard(),
            }

            if self.reader.fill().await? == 0 {
                return Err(Error::PartialFile);
            }
        }
    }

    async fn read_chunk_end(&mut self) -> Result<()> {
        match self.reader.try_read_array::<2>().await {
            Ok(Some(end)) if &end == b"\r\n" => Ok(()),
            Ok(Some(_)) => Err(HttpError::InvalidChunkEnd.into()),
            Ok(None) => Err(Error::PartialFile),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(Error::PartialFile),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_chunks(&mut self, mut state: ChunkedState, buf: &mut [u8]) -> Result<usize> {
        loop {
            self.transfer = match state {
                ChunkedState::Size => {
                    let size = self.read_chunk_size().await?;
                    Transfer::Chunks(ChunkedState::Extension(size))
                }
                ChunkedState::Extension(0) => {
                    self.read_until_newline().await?;
                    Transfer::Trailers
                }
                ChunkedState::Extension(size) => {
                    self.read_until_newline().await?;
                    Transfer::Chunks(ChunkedState::Data(size))
                }
                ChunkedState::Data(remaining) => {
                    let len = usize::try_from(remaining)
                        .unwrap_or(usize::MAX)
                        .min(buf.len());
                    let read = self.reader.read(&mut buf[..len]).await?;
                    if read == 0 {
                        return Err(Error::PartialFile);
                    }

                    let remaining = remaining - read as u64;
                    self.transfer = if remaining == 0 {
                        Transfer::Chunks(ChunkedState::ChunkEnd)
                    } else {
                        Transfer::Chunks(ChunkedState::Data(remaining))
                    };
                    return Ok(read);
                }
                ChunkedState::ChunkEnd => {
                    self.read_chunk_end().await?;
                    Transfer::Chunks(ChunkedState::Size)
                }
            };

            match self.transfer {
                Transfer::Chunks(next) => state = next,
                _ => return Ok(0),
            }
        }
    }

    /// Read body data into `buf`, returning 0 at the end of the body.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.transfer {
            Transfer::Empty | Transfer::Trailers => Ok(0),
            Transfer::Chunks(state) => self.read_chunks(state, buf).await,
            Transfer::Connection => {
                let read = self.reader.read(buf).await?;
                if read == 0 {
                    self.transfer = Transfer::Empty;
                }
                Ok(read)
            }
            Transfer::Length(remaining) => {
                let len = usize::try_from(remaining)
                    .unwrap_or(usize::MAX)
                    .min(buf.len());
                let read = self.reader.read(&mut buf[..len]).await?;
                if read == 0 {
                    return Err(Error::PartialFile);
                }

                let remaining = remaining - read as u64;
                self.transfer = if remaining > 0 {
                    Transfer::Length(remaining)
                } else {
                    Transfer::Empty
                };
                Ok(read)
            }
        }
    }

    /// Read the next trailer of a chunked body, or [`None`] after the last one.
    ///
    /// Fails if body data remains unread.
    pub async fn read_trailer(&mut self) -> Result<Option<(http::HeaderName, http::HeaderValue)>> {
        match self.transfer {
            Transfer::Trailers => (),
            Transfer::Empty => return Ok(None),
            _ => return Err(HttpError::BodyRemaining.into()),
        }

        let header = read_header_line(&mut self.reader).await?;
        if header.is_none() {
            self.transfer = Transfer::Empty;
        }
        Ok(header.map(|(key, value, _)| (key, value)))
    }

    /// Read all remaining trailers.
    pub async fn read_trailers(&mut self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        while let Some((key, value)) = self.read_trailer().await? {
            headers.append(key, value);
        }
        Ok(headers)
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; 16 * 1024];
        let read = self.read(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf))
    }

    /// Read the rest of the body.
    pub async fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut bytes = match self.remaining() {
            Some(len) => Vec::with_capacity(usize::try_from(len).unwrap_or(0).min(1 << 24)),
            None => Vec::new(),
        };
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let read = self.read(&mut buf).await?;
            if read == 0 {
                return Ok(bytes);
            }
            bytes.extend_from_slice(&buf[..read]);
        }
    }

    /// Read the rest of the body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.bytes().await?)?)
    }

    /// Read the rest of the body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        Ok(serde_json::from_slice(&self.bytes().await?)?)
    }
}

impl<S: AsyncRead + Unpin + Send + 'static> Body<S> {
    /// A stream of the body's data as it arrives.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> + Send {
        stream::try_unfold(self, |mut body| async move {
            let chunk = body.next_chunk().await?;
            Ok(chunk.map(|chunk| (chunk, body)))
        })
    }

    /// An [`AsyncRead`] over the body's data.
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        Box::pin(self.into_stream().map_err(io::Error::from)).into_async_read()
    }
}
